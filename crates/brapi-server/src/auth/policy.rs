//! Call access decisions

use super::Caller;
use crate::mapping::{CallSetting, Method};

/// Decides whether a caller may use a call
pub trait AccessPolicy: Send + Sync {
    fn allows(&self, caller: &Caller, call: &str, method: Method, setting: &CallSetting) -> bool;
}

/// Explicit per-method role lists win. Without one, reads (GET, and POST on
/// `/search/*`) are open and writes need the administrator role.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleAccessPolicy;

impl RoleAccessPolicy {
    pub fn is_read(call: &str, method: Method) -> bool {
        match method {
            Method::Get => true,
            Method::Post => call.trim_start_matches('/').starts_with("search/"),
            Method::Put | Method::Delete => false,
        }
    }
}

impl AccessPolicy for RoleAccessPolicy {
    fn allows(&self, caller: &Caller, call: &str, method: Method, setting: &CallSetting) -> bool {
        if caller.is_administrator() {
            return true;
        }
        match setting.roles_by_method.get(&method) {
            Some(roles) => caller.has_any_role(roles),
            None => Self::is_read(call, method),
        }
    }
}
