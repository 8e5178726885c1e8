use crate::http::Method;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Portal,
    Configure,
    Update,
    FactoryReset,
}

/// Paths operating systems probe to detect a captive portal.
pub const PROBE_PATHS: &[&str] = &[
    // Android
    "/generate_204",
    "/gen_204",
    // Windows
    "/fwlink",
    "/ncsi.txt",
    "/connecttest.txt",
    // Apple
    "/hotspot-detect.html",
    "/success.html",
];

const ROUTES: &[(&str, &str, Route)] = &[
    ("GET", "/", Route::Portal),
    ("POST", "/configure", Route::Configure),
    ("GET", "/update", Route::Update),
    ("POST", "/factoryreset", Route::FactoryReset),
];

/// Maps a request onto a handler. `path` must already be stripped of its
/// query string. Everything unmatched is served the portal.
pub fn route(method: &Method, path: &str) -> Route {
    let method = method.as_str();

    if let Some((_, _, route)) = ROUTES
        .iter()
        .find(|(route_method, route_path, _)| *route_method == method && *route_path == path)
    {
        return *route;
    }

    if method == "GET" && PROBE_PATHS.contains(&path) {
        log::debug!("captive portal probe {path}");
    }

    Route::Portal
}
