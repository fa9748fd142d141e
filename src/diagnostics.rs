use axum::extract::FromRequestParts;
use http::request::Parts;
use http::{Method, Uri};
use std::collections::BTreeMap;
use std::convert::Infallible;

/// What is known about the inbound request when an upstream source fails.
///
/// Both fields are best effort: a response created outside of a request handler
/// simply has neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub method: Option<Method>,
    pub url: Option<String>,
}

impl RequestContext {
    pub fn new(method: Method, uri: &Uri) -> Self {
        Self {
            method: Some(method),
            url: Some(
                uri.path_and_query()
                    .map(|path_and_query| path_and_query.as_str().to_string())
                    .unwrap_or_else(|| uri.path().to_string()),
            ),
        }
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestContext::new(parts.method.clone(), &parts.uri))
    }
}

/// Process level facts reported alongside every error envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessContext {
    pub versions: BTreeMap<String, String>,
    pub platform: String,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub groups: Option<Vec<u32>>,
}

/// Supplies the process part of the diagnostic context.
///
/// Implementations must not fail: anything the host can't tell is left as `None`.
pub trait DiagnosticContextProvider: Send + Sync {
    fn process_context(&self) -> ProcessContext;
}

/// Reports the running process: registered component versions, the OS name and,
/// on unix, the real user/group ids.
#[derive(Debug, Clone)]
pub struct ProcessDiagnostics {
    versions: BTreeMap<String, String>,
}

impl ProcessDiagnostics {
    pub fn new() -> Self {
        let mut versions = BTreeMap::new();
        versions.insert(
            env!("CARGO_PKG_NAME").to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );
        Self { versions }
    }

    pub fn with_version<K, V>(mut self, component: K, version: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.versions.insert(component.into(), version.into());
        self
    }
}

impl Default for ProcessDiagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticContextProvider for ProcessDiagnostics {
    fn process_context(&self) -> ProcessContext {
        let (uid, gid, groups) = identity::current();
        ProcessContext {
            versions: self.versions.clone(),
            platform: std::env::consts::OS.to_string(),
            uid,
            gid,
            groups,
        }
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
mod identity {
    pub(super) fn current() -> (Option<u32>, Option<u32>, Option<Vec<u32>>) {
        // SAFETY: getuid(2) and getgid(2) take no arguments and always succeed.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        (Some(uid), Some(gid), groups())
    }

    fn groups() -> Option<Vec<u32>> {
        // SAFETY: a zero-sized query only returns the number of supplementary groups.
        let count = unsafe { libc::getgroups(0, std::ptr::null_mut()) };
        if count < 0 {
            return None;
        }

        let mut groups: Vec<libc::gid_t> = vec![0; count as usize];
        // SAFETY: the buffer holds exactly `count` entries.
        let written = unsafe { libc::getgroups(count, groups.as_mut_ptr()) };
        if written < 0 {
            return None;
        }
        groups.truncate(written as usize);
        Some(groups.into_iter().map(u32::from).collect())
    }
}

#[cfg(not(unix))]
mod identity {
    pub(super) fn current() -> (Option<u32>, Option<u32>, Option<Vec<u32>>) {
        (None, None, None)
    }
}
