//! Routes mounted by plugins, grouped under a path prefix.
//!
//! The host's HTTP layer reads this table; plugins only ever touch it
//! through `mount` and `unmount`.

use tracing::debug;

/// One route contributed by a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// HTTP method, upper case.
    pub method: String,
    /// Path pattern. `{name}` segments match any single segment.
    pub path: String,
    /// Route name, qualified with the mount's name prefix once mounted.
    pub name: String,
}

impl Route {
    pub fn new(method: &str, path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.into(),
            name: name.into(),
        }
    }

    pub fn get(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new("GET", path, name)
    }

    pub fn post(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new("POST", path, name)
    }

    fn matches(&self, method: &str, path: &str) -> bool {
        if !self.method.eq_ignore_ascii_case(method) {
            return false;
        }
        let pattern: Vec<&str> = segments(&self.path).collect();
        let actual: Vec<&str> = segments(path).collect();
        pattern.len() == actual.len()
            && pattern
                .iter()
                .zip(&actual)
                .all(|(p, a)| (p.starts_with('{') && p.ends_with('}')) || p == a)
    }
}

/// Table of mounted routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Mount routes under `/{prefix}`, naming each `{name_prefix}.{name}`.
    ///
    /// A route with the same method and path as an existing one replaces it,
    /// so mounting the same set twice leaves one copy.
    pub fn mount(
        &mut self,
        prefix: &str,
        name_prefix: &str,
        routes: impl IntoIterator<Item = Route>,
    ) {
        let mut count = 0;
        for route in routes {
            let path = join(prefix, &route.path);
            let name = format!("{name_prefix}.{}", route.name);
            self.routes
                .retain(|r| !(r.method == route.method && r.path == path));
            self.routes.push(Route {
                method: route.method,
                path,
                name,
            });
            count += 1;
        }
        debug!(prefix, count, "mounted routes");
    }

    /// Remove every route at or below `/{prefix}`. Returns how many were removed.
    pub fn unmount(&mut self, prefix: &str) -> usize {
        let root = join(prefix, "");
        let nested = format!("{root}/");
        let before = self.routes.len();
        self.routes
            .retain(|r| r.path != root && !r.path.starts_with(&nested));
        let removed = before - self.routes.len();
        debug!(prefix, removed, "unmounted routes");
        removed
    }

    /// First route matching the method and concrete path.
    pub fn find(&self, method: &str, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.matches(method, path))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn clear(&mut self) {
        self.routes.clear();
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn join(prefix: &str, path: &str) -> String {
    let parts: Vec<&str> = segments(prefix).chain(segments(path)).collect();
    format!("/{}", parts.join("/"))
}
