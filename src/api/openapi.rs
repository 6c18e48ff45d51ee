use super::handlers::{
    admin, auth, catalog, favorites, health, profile, reservations, reviews, site, subscription,
};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Handlers sharing a path go in the same `routes!` call. Routes added in
/// `api::app` (`/`, `OPTIONS /health`) are not documented.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        // auth
        .routes(routes!(auth::register::register))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::session::session))
        .routes(routes!(auth::session::logout))
        .routes(routes!(auth::verification::verify_email))
        .routes(routes!(auth::verification::resend_verification))
        .routes(routes!(auth::admin::login))
        .routes(routes!(auth::admin::logout))
        // catalog
        .routes(routes!(catalog::home::home))
        .routes(routes!(catalog::reference::categories))
        .routes(routes!(catalog::reference::regular_holidays))
        .routes(routes!(catalog::restaurants::index))
        .routes(routes!(catalog::restaurants::show))
        // member
        .routes(routes!(profile::show))
        .routes(routes!(profile::edit))
        .routes(routes!(profile::update))
        .routes(routes!(site::company))
        .routes(routes!(site::terms))
        .routes(routes!(reviews::index, reviews::store))
        .routes(routes!(reviews::create))
        .routes(routes!(reviews::edit))
        .routes(routes!(reviews::update, reviews::destroy))
        // premium
        .routes(routes!(reservations::index))
        .routes(routes!(reservations::create))
        .routes(routes!(reservations::store))
        .routes(routes!(reservations::destroy))
        .routes(routes!(favorites::index))
        .routes(routes!(favorites::store, favorites::destroy))
        // subscription
        .routes(routes!(subscription::create))
        .routes(routes!(
            subscription::store,
            subscription::update,
            subscription::destroy
        ))
        .routes(routes!(subscription::edit))
        .routes(routes!(subscription::cancel))
        // back office
        .routes(routes!(admin::home::home))
        .routes(routes!(admin::users::index))
        .routes(routes!(admin::users::show))
        .routes(routes!(admin::restaurants::index, admin::restaurants::store))
        .routes(routes!(
            admin::restaurants::show,
            admin::restaurants::update,
            admin::restaurants::destroy
        ))
        .routes(routes!(admin::categories::index, admin::categories::store))
        .routes(routes!(
            admin::categories::update,
            admin::categories::destroy
        ))
        .routes(routes!(
            admin::content::show_company,
            admin::content::update_company
        ))
        .routes(routes!(
            admin::content::show_terms,
            admin::content::update_terms
        ));

    router.get_openapi_mut().tags = Some(vec![
        tag("health", "Liveness and database reachability"),
        tag("auth", "Member registration, sessions and email verification"),
        tag("catalog", "Public restaurant discovery"),
        tag("member", "Pages for verified members"),
        tag("premium", "Favorites, reservations and writing reviews"),
        tag("subscription", "Premium plan checkout and cancellation"),
        tag("admin", "Back office"),
    ]);

    router
}

fn tag(name: &str, description: &str) -> Tag {
    let mut tag = Tag::new(name);
    tag.description = Some(description.to_string());
    tag
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

    OpenApiBuilder::new().info(info).build()
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
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));

        let contact = spec.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team NagoyaMeshi"));
            assert_eq!(contact.email.as_deref(), Some("team@nagoyameshi.jp"));
        }

        let license = spec.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.identifier.as_deref(), Some("BSD-3-Clause"));
        }
    }

    #[test]
    fn every_area_is_documented() {
        let spec = openapi();
        let tags = spec.tags.clone().unwrap_or_default();
        for name in ["auth", "catalog", "member", "premium", "subscription", "admin"] {
            assert!(tags.iter().any(|tag| tag.name == name), "missing tag {name}");
        }
        for path in [
            "/v1/restaurants",
            "/v1/restaurants/{id}/reviews/{review_id}",
            "/v1/favorites/{restaurant_id}",
            "/v1/subscription",
            "/v1/admin/restaurants/{id}",
            "/v1/admin/terms",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing path {path}");
        }
    }

    #[test]
    fn parse_author_variants() {
        assert_eq!(
            parse_author("Team NagoyaMeshi <team@nagoyameshi.jp>"),
            (Some("Team NagoyaMeshi"), Some("team@nagoyameshi.jp"))
        );
        assert_eq!(parse_author("Solo"), (Some("Solo"), None));
        assert_eq!(parse_author("<only@mail>"), (None, Some("only@mail")));
    }
}
