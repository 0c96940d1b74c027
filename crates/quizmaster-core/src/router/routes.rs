use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("Route {0} declares both requiresAdmin and requiresUser")]
    ConflictingRoles(String),

    #[error("Route {0} declares both requiresGuest and requiresAuth")]
    GuestAndAuth(String),

    #[error("Invalid route path: {0}")]
    InvalidPath(String),

    #[error("Duplicate route name: {0}")]
    DuplicateName(String),

    #[error("Route table has no {0} route to redirect to")]
    MissingRedirectTarget(&'static str),

    #[error("No route matches {0}")]
    NotFound(String),

    #[error("Too many redirects while navigating to {0}")]
    RedirectLoop(String),

    #[error("Failed to load route table: {0}")]
    Load(String),
}

/// Access requirements declared by a route.
///
/// Serialized with the flag names of the route `meta` block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirements {
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default)]
    pub requires_guest: bool,
    #[serde(default)]
    pub requires_admin: bool,
    #[serde(default)]
    pub requires_user: bool,
}

impl Requirements {
    pub const NONE: Self = Self {
        requires_auth: false,
        requires_guest: false,
        requires_admin: false,
        requires_user: false,
    };

    pub const fn guest() -> Self {
        Self {
            requires_guest: true,
            ..Self::NONE
        }
    }

    pub const fn auth() -> Self {
        Self {
            requires_auth: true,
            ..Self::NONE
        }
    }

    pub const fn admin() -> Self {
        Self {
            requires_auth: true,
            requires_admin: true,
            ..Self::NONE
        }
    }

    /// Authenticated, non-admin context.
    pub const fn user() -> Self {
        Self {
            requires_auth: true,
            requires_user: true,
            ..Self::NONE
        }
    }

    fn validate(&self, name: &str) -> Result<(), RouteError> {
        if self.requires_admin && self.requires_user {
            return Err(RouteError::ConflictingRoles(name.to_string()));
        }
        if self.requires_guest && self.requires_auth {
            return Err(RouteError::GuestAndAuth(name.to_string()));
        }
        Ok(())
    }
}

/// Where the navigation guard may send a rejected transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedirectTarget {
    Dashboard,
    Login,
    AdminHome,
}

impl RedirectTarget {
    pub const ALL: [RedirectTarget; 3] = [Self::Dashboard, Self::Login, Self::AdminHome];

    /// Name of the route this target resolves to in the route table.
    pub const fn route_name(&self) -> &'static str {
        match self {
            Self::Dashboard => "Dashboard",
            Self::Login => "Login",
            Self::AdminHome => "AdminDashboard",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A view's path, name and access requirements. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    path: String,
    name: String,
    requirements: Requirements,
    segments: Vec<Segment>,
}

impl RouteDescriptor {
    /// Build a descriptor, rejecting contradictory requirement sets.
    pub fn new(
        path: impl Into<String>,
        name: impl Into<String>,
        requirements: Requirements,
    ) -> Result<Self, RouteError> {
        let path = path.into();
        let name = name.into();
        requirements.validate(&name)?;

        if !path.starts_with('/') {
            return Err(RouteError::InvalidPath(path));
        }
        let mut segments = Vec::new();
        for part in split_path(&path) {
            match part.strip_prefix(':') {
                Some("") => return Err(RouteError::InvalidPath(path.clone())),
                Some(param) => segments.push(Segment::Param(param.to_string())),
                None => segments.push(Segment::Literal(part.to_string())),
            }
        }

        Ok(Self {
            path,
            name,
            requirements,
            segments,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requirements(&self) -> Requirements {
        self.requirements
    }

    /// Match a concrete path, returning the captured `:param` values.
    pub fn matches(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let parts: Vec<&str> = split_path(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = BTreeMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(params)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|part| !part.is_empty())
}

/// Strip query and fragment from a navigation target.
pub(crate) fn route_path(target: &str) -> &str {
    let end = target.find(['?', '#']).unwrap_or(target.len());
    &target[..end]
}

#[derive(Debug, Deserialize)]
struct RouteSpec {
    path: String,
    name: String,
    #[serde(default)]
    meta: Requirements,
}

/// The static route declarations consulted by the navigation guard.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<RouteDescriptor>,
}

impl RouteTable {
    /// Build a table. Names must be unique and every guard redirect target
    /// (`Dashboard`, `Login`, `AdminDashboard`) must be declared.
    pub fn new(routes: Vec<RouteDescriptor>) -> Result<Self, RouteError> {
        for (i, route) in routes.iter().enumerate() {
            if routes[..i].iter().any(|other| other.name == route.name) {
                return Err(RouteError::DuplicateName(route.name.clone()));
            }
        }
        let table = Self { routes };
        for target in RedirectTarget::ALL {
            if table.by_name(target.route_name()).is_none() {
                return Err(RouteError::MissingRedirectTarget(target.route_name()));
            }
        }
        Ok(table)
    }

    /// Parse a JSON array of `{path, name, meta}` declarations.
    pub fn from_json(json: &str) -> Result<Self, RouteError> {
        let specs: Vec<RouteSpec> =
            serde_json::from_str(json).map_err(|e| RouteError::Load(e.to_string()))?;
        let routes = specs
            .into_iter()
            .map(|spec| RouteDescriptor::new(spec.path, spec.name, spec.meta))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(routes)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read route table {}", path.display()))?;
        Ok(Self::from_json(&contents)?)
    }

    pub fn by_name(&self, name: &str) -> Option<&RouteDescriptor> {
        self.routes.iter().find(|route| route.name == name)
    }

    /// First declared route matching `target`, with its captured params.
    pub fn resolve(&self, target: &str) -> Option<(&RouteDescriptor, BTreeMap<String, String>)> {
        let path = route_path(target);
        self.routes
            .iter()
            .find_map(|route| route.matches(path).map(|params| (route, params)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteDescriptor> {
        self.routes.iter()
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        let declarations = [
            ("/", "Home", Requirements::NONE),
            ("/login", "Login", Requirements::guest()),
            ("/register", "Register", Requirements::guest()),
            ("/dashboard", "Dashboard", Requirements::auth()),
            ("/profile", "Profile", Requirements::auth()),
            ("/quiz/:id/attempt", "QuizAttempt", Requirements::user()),
            ("/admin", "AdminDashboard", Requirements::admin()),
            ("/admin/subjects", "SubjectManagement", Requirements::admin()),
            ("/admin/chapters", "ChapterManagement", Requirements::admin()),
            ("/admin/quizzes", "QuizManagement", Requirements::admin()),
            ("/admin/questions", "QuestionManagement", Requirements::admin()),
            ("/admin/users", "UserManagement", Requirements::admin()),
        ];
        let routes = declarations
            .into_iter()
            .filter_map(|(path, name, requirements)| {
                RouteDescriptor::new(path, name, requirements).ok()
            })
            .collect();
        Self { routes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicting_role_requirements_rejected() {
        let both = Requirements {
            requires_admin: true,
            requires_user: true,
            ..Requirements::auth()
        };
        assert_eq!(
            RouteDescriptor::new("/x", "X", both),
            Err(RouteError::ConflictingRoles("X".to_string()))
        );
    }

    #[test]
    fn test_guest_and_auth_rejected() {
        let both = Requirements {
            requires_guest: true,
            ..Requirements::auth()
        };
        assert!(matches!(
            RouteDescriptor::new("/x", "X", both),
            Err(RouteError::GuestAndAuth(_))
        ));
    }

    #[test]
    fn test_param_segments_capture() {
        let route = RouteDescriptor::new("/quiz/:id/attempt", "QuizAttempt", Requirements::user())
            .unwrap();
        let params = route.matches("/quiz/42/attempt").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert!(route.matches("/quiz/42").is_none());
        assert!(route.matches("/quiz/42/review").is_none());
    }

    #[test]
    fn test_default_table_resolves_app_routes() {
        let table = RouteTable::default();
        assert_eq!(table.iter().count(), 12);
        assert_eq!(table.resolve("/").unwrap().0.name(), "Home");
        assert_eq!(table.resolve("/admin/users/").unwrap().0.name(), "UserManagement");
        assert_eq!(table.resolve("/login?next=/profile").unwrap().0.name(), "Login");
        assert!(table.resolve("/nowhere").is_none());
        for target in RedirectTarget::ALL {
            assert!(table.by_name(target.route_name()).is_some());
        }
    }

    #[test]
    fn test_from_json_reads_meta_flags() {
        let json = r#"[
            {"path": "/login", "name": "Login", "meta": {"requiresGuest": true}},
            {"path": "/dashboard", "name": "Dashboard", "meta": {"requiresAuth": true}},
            {"path": "/admin", "name": "AdminDashboard", "meta": {"requiresAuth": true, "requiresAdmin": true}},
            {"path": "/about", "name": "About"}
        ]"#;
        let table = RouteTable::from_json(json).unwrap();
        assert_eq!(table.by_name("AdminDashboard").unwrap().requirements(), Requirements::admin());
        assert_eq!(table.by_name("About").unwrap().requirements(), Requirements::NONE);
    }

    #[test]
    fn test_from_json_rejects_conflicts_and_missing_targets() {
        let conflicting = r#"[{"path": "/x", "name": "X", "meta": {"requiresAdmin": true, "requiresUser": true}}]"#;
        assert!(matches!(
            RouteTable::from_json(conflicting),
            Err(RouteError::ConflictingRoles(_))
        ));

        let missing = r#"[{"path": "/login", "name": "Login"}]"#;
        assert!(matches!(
            RouteTable::from_json(missing),
            Err(RouteError::MissingRedirectTarget(_))
        ));

        assert!(matches!(RouteTable::from_json("nope"), Err(RouteError::Load(_))));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let routes = vec![
            RouteDescriptor::new("/a", "Dashboard", Requirements::auth()).unwrap(),
            RouteDescriptor::new("/b", "Dashboard", Requirements::auth()).unwrap(),
        ];
        assert_eq!(
            RouteTable::new(routes).unwrap_err(),
            RouteError::DuplicateName("Dashboard".to_string())
        );
    }

    #[test]
    fn test_invalid_paths_rejected() {
        assert!(RouteDescriptor::new("relative", "R", Requirements::NONE).is_err());
        assert_eq!(
            RouteDescriptor::new("/quiz/:", "Q", Requirements::NONE),
            Err(RouteError::InvalidPath("/quiz/:".to_string()))
        );
    }
}
