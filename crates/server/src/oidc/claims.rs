//! Claims assembly.
//!
//! Turns an [`Identity`] and a granted scope list into the claim set released
//! through userinfo (and asserted in the ID token). Guests have a narrower
//! claim surface than registered users; which claims a scope contributes for
//! which kind of identity is decided in one exhaustive match.

use crate::error::{ProviderError, ProviderResult};
use crate::oidc::identity::Identity;
use crate::upstream::{GroupPermissionService, Permission, PermissionService, PictureService};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;

const PLS_PREFIX: &str = "pls_";

/// A scope the assembler knows how to satisfy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    OpenId,
    Profile,
    Email,
    Permissions,
    Pls(String),
    Picture,
    YearTag,
}

impl Scope {
    /// `None` for scopes that contribute no claims (`offline_access`, or anything
    /// the client scope check already should have rejected).
    pub fn parse(scope: &str) -> Option<Self> {
        match scope {
            "openid" => Some(Scope::OpenId),
            "profile" => Some(Scope::Profile),
            "email" => Some(Scope::Email),
            "permissions" => Some(Scope::Permissions),
            "picture" => Some(Scope::Picture),
            "year_tag" => Some(Scope::YearTag),
            other => other
                .strip_prefix(PLS_PREFIX)
                .filter(|group| !group.is_empty())
                .map(|group| Scope::Pls(group.to_string())),
        }
    }
}

/// The userinfo claim set. Absent claims are omitted from the JSON entirely.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct UserInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Vec<Object>>)]
    pub permissions: Option<Vec<Permission>>,
    /// `pls_<group>` claims, one per requested group.
    #[serde(flatten)]
    pub group_permissions: BTreeMap<String, Vec<String>>,
}

impl UserInfo {
    /// Claims as a JSON object, for merging into an ID token.
    pub fn to_claims(&self) -> ProviderResult<serde_json::Map<String, serde_json::Value>> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(_) => Err(ProviderError::Internal("claims did not serialize to an object".into())),
            Err(e) => Err(ProviderError::Internal(format!("failed to serialize claims: {e}"))),
        }
    }
}

/// Assembles claims, calling out to the permission and picture services.
#[derive(Clone)]
pub struct ClaimsAssembler {
    permissions: Arc<dyn PermissionService>,
    group_permissions: Arc<dyn GroupPermissionService>,
    pictures: Arc<dyn PictureService>,
}

impl ClaimsAssembler {
    pub fn new(
        permissions: Arc<dyn PermissionService>,
        group_permissions: Arc<dyn GroupPermissionService>,
        pictures: Arc<dyn PictureService>,
    ) -> Self {
        Self {
            permissions,
            group_permissions,
            pictures,
        }
    }

    /// Build the claim set for `identity` under `scopes`. Any upstream failure
    /// aborts the whole assembly.
    #[tracing::instrument(
        skip(self, identity),
        fields(sub = identity.id(), guest = identity.is_guest())
    )]
    pub async fn assemble(
        &self,
        identity: &Identity,
        scopes: &[String],
        permission_namespace: Option<&str>,
    ) -> ProviderResult<UserInfo> {
        let mut info = UserInfo::default();
        for scope in scopes.iter().filter_map(|s| Scope::parse(s)) {
            match (scope, identity) {
                (Scope::OpenId, _) => {
                    info.sub = Some(identity.id().to_string());
                }
                (Scope::Profile, Identity::Registered(user)) => {
                    info.name = Some(full_name(&user.first_name, &user.family_name));
                    info.given_name = Some(user.first_name.clone());
                    info.family_name = Some(user.family_name.clone());
                }
                (Scope::Profile, Identity::Guest(guest)) => {
                    info.name = Some(full_name(&guest.first_name, &guest.family_name));
                    info.given_name = Some(guest.first_name.clone());
                    info.family_name = Some(guest.family_name.clone());
                }
                (Scope::Email, Identity::Registered(user)) => {
                    info.email = Some(user.email.clone());
                    info.email_verified = Some(true);
                }
                (Scope::Email, Identity::Guest(guest)) => {
                    info.email = Some(guest.email());
                    info.email_verified = Some(true);
                }
                (Scope::Permissions, Identity::Registered(user)) => {
                    let namespace = permission_namespace.ok_or_else(|| {
                        ProviderError::bad_request(
                            "permissions scope requested by a client without a permission namespace",
                        )
                    })?;
                    info.permissions = Some(
                        self.permissions
                            .get_permissions(&user.kthid, namespace)
                            .await?,
                    );
                }
                (Scope::Pls(group), Identity::Registered(user)) => {
                    let granted = self
                        .group_permissions
                        .get_permissions(&user.kthid, &group)
                        .await?;
                    info.group_permissions
                        .insert(format!("{PLS_PREFIX}{group}"), granted);
                }
                (Scope::YearTag, Identity::Registered(user)) => {
                    info.year_tag = Some(user.year_tag.clone());
                }
                (Scope::Picture, Identity::Registered(user)) => {
                    info.picture = Some(self.pictures.get_picture(&user.kthid).await?);
                }
                (
                    Scope::Permissions | Scope::Pls(_) | Scope::YearTag | Scope::Picture,
                    Identity::Guest(_),
                ) => {}
            }
        }
        Ok(info)
    }
}

fn full_name(first: &str, family: &str) -> String {
    format!("{first} {family}").trim().to_string()
}
