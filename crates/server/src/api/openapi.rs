//! OpenAPI/Utoipa configuration.

use crate::api::health::MISC_TAG;
use crate::oidc::OIDC_TAG;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    #[tracing::instrument(skip(self, openapi))]
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);

        let bearer = HttpBuilder::new()
            .scheme(HttpAuthScheme::Bearer)
            .bearer_format("JWT")
            .description(Some(
                "Access token from the `/token` endpoint. Valid for one minute.",
            ))
            .build();
        components.add_security_scheme("bearer_auth", SecurityScheme::Http(bearer));

        let basic = HttpBuilder::new()
            .scheme(HttpAuthScheme::Basic)
            .description(Some(
                "Client id and secret (`client_secret_basic`), both form-urlencoded.",
            ))
            .build();
        components.add_security_scheme("client_auth", SecurityScheme::Http(basic));
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "SSO OpenID Provider API",
        version = "1.0.0",
        description = "OpenID Connect provider for institutional single sign-on."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = OIDC_TAG, description = "OpenID Connect endpoints")
    )
)]
pub struct ApiDoc;
