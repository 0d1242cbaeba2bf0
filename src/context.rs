//! Builds the `github_context` fragment attached to every entry.

use crate::core::{GithubContext, Repository};
use sysinfo::{System, Users};

const GITHUB_BASE_URL: &str = "https://github.com/";

/// Parses a comma separated `owner/repo` list.
///
/// Tokens are trimmed, empty tokens are dropped and order is preserved.
/// The `owner/repo` shape is not validated.
pub fn parse_repositories(raw: &str) -> Vec<Repository> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| Repository {
            name: token.to_string(),
            url: format!("{}{}", GITHUB_BASE_URL, token),
        })
        .collect()
}

pub fn build_github_context(raw_repos: &str, user: &str) -> GithubContext {
    GithubContext {
        user: user.to_string(),
        repositories: parse_repositories(raw_repos),
    }
}

/// Returns the login name of the user running this process.
///
/// Looks up the owner of the current process first, then falls back to the
/// `USER` and `LOGNAME` environment variables.
pub fn resolve_user() -> String {
    current_process_owner()
        .or_else(|| std::env::var("USER").ok())
        .or_else(|| std::env::var("LOGNAME").ok())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn current_process_owner() -> Option<String> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut system = System::new();
    system.refresh_process(pid);
    let uid = system.process(pid)?.user_id()?.clone();
    let users = Users::new_with_refreshed_list();
    users.get_user_by_id(&uid).map(|user| user.name().to_string())
}
