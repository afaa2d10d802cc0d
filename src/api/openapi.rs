use axum::{
    middleware,
    routing::{delete, get},
};
use utoipa::openapi::{
    security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Components, Contact, InfoBuilder, License, OpenApiBuilder, Tag,
};
use utoipa_axum::{
    router::{OpenApiRouter, UtoipaMethodRouter},
    routes,
};

use super::handlers::{auth, health, users};
use crate::{
    auth::{guard::enforce, GuardChain},
    store::Role,
};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI document.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Attach a guard chain to every method of a documented route.
fn guarded(route: UtoipaMethodRouter, chain: GuardChain) -> UtoipaMethodRouter {
    let (schemas, paths, method_router) = route;
    (
        schemas,
        paths,
        method_router.route_layer(middleware::from_fn_with_state(chain, enforce)),
    )
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and included in the generated `OpenAPI` document. Protected routes are wrapped
/// in [`guarded`] with the chain they require.
pub(crate) fn api_router() -> OpenApiRouter {
    // `/users/{id}` mixes an optional-auth GET with an authenticated DELETE, so
    // the documented pair gets a hand-built method router with one chain each.
    let (schemas, paths, _): UtoipaMethodRouter = routes!(users::get_user, users::delete_user);
    let user_by_id = get(users::get_user)
        .route_layer(middleware::from_fn_with_state(
            GuardChain::optional(),
            enforce,
        ))
        .merge(delete(users::delete_user).route_layer(middleware::from_fn_with_state(
            GuardChain::authenticated(),
            enforce,
        )));

    OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::register))
        .routes(routes!(auth::login))
        .routes(routes!(auth::provider_login))
        .routes(routes!(auth::provider_callback))
        .routes(guarded(
            routes!(users::get_me, users::patch_me),
            GuardChain::authenticated(),
        ))
        .routes(guarded(
            routes!(users::list_users),
            GuardChain::roles(&[Role::Admin]),
        ))
        .routes((schemas, paths, user_by_id))
        .routes(guarded(
            routes!(users::set_role),
            GuardChain::roles(&[Role::Admin]),
        ))
        .routes(guarded(
            routes!(users::set_status),
            GuardChain::roles(&[Role::Admin]),
        ))
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    let mut components = Components::new();
    components.add_security_scheme(
        "bearer",
        SecurityScheme::Http(
            HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("JWT")
                .build(),
        ),
    );

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Service and credential store health".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Registration, local login and provider login".to_string());

    let mut users_tag = Tag::new("users");
    users_tag.description = Some("Profiles and account administration".to_string());

    OpenApiBuilder::new()
        .info(info)
        .components(Some(components))
        .tags(Some(vec![health_tag, auth_tag, users_tag]))
        .build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    let Some(start) = author.find('<') else {
        let name = author.trim();
        return ((!name.is_empty()).then_some(name), None);
    };
    let name = author[..start].trim();
    let email = author[start + 1..].trim_end_matches('>').trim();
    (
        (!name.is_empty()).then_some(name),
        (!email.is_empty()).then_some(email),
    )
}
