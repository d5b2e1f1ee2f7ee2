//! OpenAPI Specification for the Papyrus API
//!
//! Generated by utoipa from route annotations and schema derives. Served at
//! `/openapi.json` and printed by the `generate-openapi` binary.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use papyrus_core::{AccountProfile, ProfileUpdate};

use crate::error::{ApiError, ErrorCode};
use crate::routes::{account, activation, health, paper};

/// OpenAPI document for the Papyrus API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Papyrus API",
        version = "0.1.0",
        description = "Mini-program login, profiles, activation codes and cached paper answers",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Accounts", description = "Login exchange and profiles"),
        (name = "Papers", description = "Cached question/answer lookups"),
        (name = "Activation", description = "Activation code allocation"),
        (name = "Health", description = "Liveness and readiness")
    ),
    paths(
        account::login,
        account::get_profile,
        account::update_profile,
        paper::get_paper_answers,
        activation::allocate_code,
        health::ping,
        health::readiness,
    ),
    components(schemas(
        ApiError,
        ErrorCode,
        AccountProfile,
        ProfileUpdate,
        account::LoginResponse,
        account::MessageResponse,
        paper::PaperAnswerResponse,
        activation::ActivationCodeResponse,
        health::HealthResponse,
        health::HealthStatus,
        health::HealthDetails,
        health::ComponentHealth,
    )),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the two secret schemes referenced by the route annotations.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_secret",
            SecurityScheme::ApiKey(ApiKey::Query(ApiKeyValue::with_description(
                "sec",
                "Shared API secret; the x-api-secret header is also accepted",
            ))),
        );
        components.add_security_scheme(
            "activation_secret",
            SecurityScheme::ApiKey(ApiKey::Query(ApiKeyValue::with_description(
                "sec",
                "Operator secret for code allocation",
            ))),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for expected in [
            "/wx-login",
            "/wx-profile",
            "/paper_answers",
            "/activate_code",
            "/health/ping",
            "/health/ready",
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn test_security_schemes_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("api_secret"));
        assert!(components.security_schemes.contains_key("activation_secret"));
    }
}
