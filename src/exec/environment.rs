//! Scrubbed subprocess environment.
//!
//! Widget scripts never inherit the parent environment. They get a fixed
//! minimal `PATH` plus a short passthrough list; loader hooks, SSH agent
//! sockets, credential material, and the parent's `TERM` stay behind.

/// Fixed `PATH` handed to every widget script.
pub const MINIMAL_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Parent variables whose values are forwarded when present.
const PASSTHROUGH: &[&str] = &["HOME", "USER", "LANG"];

/// Build the replacement environment from the live parent process.
#[must_use]
pub fn scrubbed_environment() -> Vec<(String, String)> {
    scrubbed_from(std::env::vars())
}

/// Build the replacement environment from an explicit parent snapshot.
pub fn scrubbed_from<I>(parent: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env = vec![("PATH".to_string(), MINIMAL_PATH.to_string())];
    for (name, value) in parent {
        if PASSTHROUGH.contains(&name.as_str()) {
            env.push((name, value));
        }
    }
    env
}
