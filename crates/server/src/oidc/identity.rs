//! Principals the login subsystem can hand to the provider.
//!
//! An [`Identity`] is either a registered user, backed by a row in the user
//! directory, or a guest whose profile only exists for the duration of the
//! login. The identity is stored on the authorization request as an encoded
//! subject string (`kthid=<id>` or `guest=<json>`).

use crate::entity::user;
use crate::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const REGISTERED_KEY: &str = "kthid";
const GUEST_KEY: &str = "guest";

/// Domain every institutional mailbox lives under.
pub const INSTITUTION_EMAIL_DOMAIN: &str = "kth.se";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisteredUser {
    pub kthid: String,
    pub email: String,
    pub first_name: String,
    pub family_name: String,
    pub year_tag: String,
}

impl From<user::Model> for RegisteredUser {
    fn from(model: user::Model) -> Self {
        Self {
            kthid: model.kthid,
            email: model.email,
            first_name: model.first_name,
            family_name: model.family_name,
            year_tag: model.year_tag,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestUser {
    pub kthid: String,
    pub first_name: String,
    pub family_name: String,
}

impl GuestUser {
    /// Guests have no directory entry, so their address is derived.
    pub fn email(&self) -> String {
        format!("{}@{}", self.kthid, INSTITUTION_EMAIL_DOMAIN)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identity {
    Registered(RegisteredUser),
    Guest(GuestUser),
}

impl Identity {
    /// The `sub` claim released to clients.
    pub fn id(&self) -> &str {
        match self {
            Identity::Registered(user) => &user.kthid,
            Identity::Guest(guest) => &guest.kthid,
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Identity::Guest(_))
    }

    /// Encode as an authorization request subject.
    pub fn to_subject(&self) -> ProviderResult<String> {
        match self {
            Identity::Registered(user) => Ok(format!("{REGISTERED_KEY}={}", user.kthid)),
            Identity::Guest(guest) => {
                let json = serde_json::to_string(guest).map_err(|e| {
                    ProviderError::Internal(format!("failed to serialize guest profile: {e}"))
                })?;
                Ok(format!("{GUEST_KEY}={json}"))
            }
        }
    }
}

/// A decoded subject. Registered subjects still need a directory lookup before
/// they become an [`Identity`]; guests carry their whole profile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubjectRef {
    Registered(String),
    Guest(GuestUser),
}

impl SubjectRef {
    /// Parse an encoded subject. A subject without a `key=` prefix is read as a
    /// registered user id.
    pub fn parse(subject: &str) -> ProviderResult<Self> {
        if subject.is_empty() {
            return Err(ProviderError::bad_request("empty subject"));
        }
        match subject.split_once('=') {
            Some((REGISTERED_KEY, kthid)) if !kthid.is_empty() => {
                Ok(SubjectRef::Registered(kthid.to_string()))
            }
            Some((GUEST_KEY, json)) => serde_json::from_str(json)
                .map(SubjectRef::Guest)
                .map_err(|e| ProviderError::bad_request(format!("invalid guest subject: {e}"))),
            Some((key, _)) => Err(ProviderError::bad_request(format!(
                "unknown subject kind `{key}`"
            ))),
            None => Ok(SubjectRef::Registered(subject.to_string())),
        }
    }
}

/// Identity resolution for registered users.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, kthid: &str) -> ProviderResult<Option<RegisteredUser>>;
}

/// Resolve a subject to a full identity, loading registered users from the
/// directory. A registered subject whose user has disappeared is an internal
/// fault: the subject was only ever written after a successful login.
#[tracing::instrument(skip(users))]
pub async fn resolve_subject(users: &dyn UserDirectory, subject: &str) -> ProviderResult<Identity> {
    match SubjectRef::parse(subject)? {
        SubjectRef::Guest(guest) => Ok(Identity::Guest(guest)),
        SubjectRef::Registered(kthid) => match users.get_user(&kthid).await? {
            Some(user) => Ok(Identity::Registered(user)),
            None => {
                tracing::error!(kthid = %kthid, "Subject refers to a user that does not exist");
                Err(ProviderError::Internal(format!("no user with kthid {kthid}")))
            }
        },
    }
}

/// SeaORM-backed user directory.
#[derive(Clone)]
pub struct DbUserDirectory {
    db: Arc<DatabaseConnection>,
}

impl DbUserDirectory {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for DbUserDirectory {
    async fn get_user(&self, kthid: &str) -> ProviderResult<Option<RegisteredUser>> {
        Ok(user::Entity::find_by_id(kthid)
            .one(self.db.as_ref())
            .await?
            .map(RegisteredUser::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guest() -> GuestUser {
        GuestUser {
            kthid: "gst42".into(),
            first_name: "Gus".into(),
            family_name: "Guest".into(),
        }
    }

    #[test]
    fn registered_subject_encoding() {
        let identity = Identity::Registered(RegisteredUser {
            kthid: "abc123".into(),
            email: "abc123@kth.se".into(),
            first_name: "A".into(),
            family_name: "B".into(),
            year_tag: "D22".into(),
        });
        let subject = identity.to_subject().unwrap();
        assert_eq!(subject, "kthid=abc123");
        assert_eq!(
            SubjectRef::parse(&subject).unwrap(),
            SubjectRef::Registered("abc123".into())
        );
    }

    #[test]
    fn guest_subject_carries_profile() {
        let subject = Identity::Guest(guest()).to_subject().unwrap();
        assert!(subject.starts_with("guest={"));
        assert_eq!(SubjectRef::parse(&subject).unwrap(), SubjectRef::Guest(guest()));
    }

    #[test]
    fn bare_subject_is_registered() {
        assert_eq!(
            SubjectRef::parse("u1").unwrap(),
            SubjectRef::Registered("u1".into())
        );
    }

    #[test]
    fn malformed_subjects_are_rejected() {
        assert!(SubjectRef::parse("").is_err());
        assert!(SubjectRef::parse("kthid=").is_err());
        assert!(SubjectRef::parse("guest={not json").is_err());
        assert!(SubjectRef::parse("admin=root").is_err());
    }

    #[test]
    fn guest_email_is_derived() {
        assert_eq!(guest().email(), "gst42@kth.se");
        assert_eq!(Identity::Guest(guest()).id(), "gst42");
    }
}
