use std::collections::BTreeSet;

use crate::contract::{HttpMethod, RouteSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteDomain {
    System,
    Uploads,
    Tasks,
}

impl RouteDomain {
    pub fn from_path(path: &str) -> Self {
        match path {
            "/health" | "/variants" => Self::System,
            "/upload" => Self::Uploads,
            _ => Self::Tasks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDefinition {
    pub spec: RouteSpec,
    pub domain: RouteDomain,
    pub handler_id: String,
}

pub fn route_catalog() -> Vec<RouteDefinition> {
    let mut out = Vec::with_capacity(CONTRACT_ROUTES.len());
    let mut seen = BTreeSet::new();

    for (method, path) in CONTRACT_ROUTES {
        let spec = RouteSpec::new(*method, *path).expect("contract routes must be valid");
        assert!(
            seen.insert(spec.clone()),
            "duplicate route in contract list: {spec}"
        );

        out.push(RouteDefinition {
            domain: RouteDomain::from_path(spec.path.as_str()),
            handler_id: handler_id_for(spec.method, spec.path.as_str()),
            spec,
        });
    }

    out
}

fn handler_id_for(method: HttpMethod, path: &str) -> String {
    let mut tokens = vec![method.as_str().to_ascii_lowercase()];
    for part in path.trim_matches('/').split('/') {
        let normalized = part
            .trim_matches(|ch| ch == '{' || ch == '}')
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() {
                    ch.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect::<String>();
        tokens.push(normalized);
    }
    tokens.join("_")
}

const CONTRACT_ROUTES: &[(HttpMethod, &str)] = &[
    (HttpMethod::Get, "/health"),
    (HttpMethod::Get, "/variants"),
    (HttpMethod::Post, "/upload"),
    (HttpMethod::Post, "/status"),
    (HttpMethod::Post, "/{toolVariant}"),
];
