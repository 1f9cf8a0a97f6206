//! Argument vectors for each engine subcommand.

use secrecy::ExposeSecret;

use super::config::InstanceConfig;

const JSON_OUTPUT: [&str; 2] = ["-o", "json"];
const PASSWORD_FLAG: &str = "--password";
const REDACTED: &str = "***";

fn named(verb: &str, name: &str) -> Vec<String> {
    vec![verb.to_owned(), "--name".to_owned(), name.to_owned()]
}

fn push_pair(args: &mut Vec<String>, flag: &str, value: impl Into<String>) {
    args.push(flag.to_owned());
    args.push(value.into());
}

pub(crate) fn start(config: &InstanceConfig) -> Vec<String> {
    let mut args = named("start", config.name());
    if let Some(port) = config.port() {
        push_pair(&mut args, "--port", port.to_string());
    }
    push_pair(&mut args, "--username", config.username());
    push_pair(&mut args, PASSWORD_FLAG, config.password().expose_secret());
    push_pair(&mut args, "--database", config.database());
    if let Some(dir) = config.data_dir() {
        push_pair(&mut args, "--data-dir", dir.as_str());
    }
    for (key, value) in config.settings() {
        push_pair(&mut args, "-c", format!("{key}={value}"));
    }
    args
}

pub(crate) fn stop(name: &str) -> Vec<String> {
    named("stop", name)
}

pub(crate) fn drop(name: &str, force: bool) -> Vec<String> {
    let mut args = named("drop", name);
    if force {
        args.push("--force".to_owned());
    }
    args
}

pub(crate) fn info(name: &str) -> Vec<String> {
    let mut args = named("info", name);
    args.extend(JSON_OUTPUT.map(str::to_owned));
    args
}

pub(crate) fn list() -> Vec<String> {
    let mut args = vec!["list".to_owned()];
    args.extend(JSON_OUTPUT.map(str::to_owned));
    args
}

pub(crate) fn list_extensions() -> Vec<String> {
    vec!["list-extensions".to_owned()]
}

pub(crate) fn install_extension(name: &str, extension: &str) -> Vec<String> {
    let mut args = named("install-extension", name);
    args.push(extension.to_owned());
    args
}

pub(crate) fn logs(name: &str, lines: Option<usize>) -> Vec<String> {
    let mut args = named("logs", name);
    if let Some(count) = lines {
        push_pair(&mut args, "-n", count.to_string());
    }
    args
}

pub(crate) fn psql<S: AsRef<str>>(name: &str, extra: &[S]) -> Vec<String> {
    let mut args = named("psql", name);
    args.extend(extra.iter().map(|arg| arg.as_ref().to_owned()));
    args
}

/// Renders `args` for logging with the password value masked.
pub(crate) fn redacted(args: &[String]) -> String {
    let mut rendered = Vec::with_capacity(args.len());
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            rendered.push(REDACTED);
            mask_next = false;
        } else {
            mask_next = arg == PASSWORD_FLAG;
            rendered.push(arg.as_str());
        }
    }
    rendered.join(" ")
}
