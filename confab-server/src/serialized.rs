//! All schemas that are exposed from endpoints are defined here
//! along with the conversion impls

use confab_chat::{protocol, MessageData, SessionData, UserData};
use serde::Serialize;

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

/// What register and login hand back: the bearer token and the profile the
/// client keeps around
#[derive(Debug, Serialize)]
pub struct AuthResult {
    token: String,
    user: protocol::User,
}

impl ToSerialized<protocol::User> for UserData {
    fn to_serialized(&self) -> protocol::User {
        self.clone().into()
    }
}

impl ToSerialized<protocol::Message> for MessageData {
    fn to_serialized(&self) -> protocol::Message {
        self.clone().into()
    }
}

impl ToSerialized<AuthResult> for SessionData {
    fn to_serialized(&self) -> AuthResult {
        AuthResult {
            token: self.token.clone(),
            user: self.user.to_serialized(),
        }
    }
}
