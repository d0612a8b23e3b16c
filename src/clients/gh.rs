//! GitHub access through the `gh` CLI.
//!
//! Every call runs `gh` non-interactively with a hard timeout. Failures are
//! classified from stderr into the [`ClientError`] taxonomy.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::release::is_plain_file_name;

use super::{
    ArtifactRepositoryClient, ClientError, NewRelease, ReleaseRef, SourceRepositoryClient,
    UpstreamRelease,
};

/// Page size for release listings (the API maximum)
const RELEASES_PER_PAGE: usize = 100;

/// Stop paging after this many pages
const MAX_RELEASE_PAGES: u32 = 50;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// `gh` CLI client
pub struct GhCli {
    program: PathBuf,
    token: Option<String>,
    timeout: Duration,
}

impl fmt::Debug for GhCli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GhCli")
            .field("program", &self.program)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Deserialize)]
struct GhReleaseView {
    #[serde(rename = "tagName")]
    tag_name: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    body: String,
    url: String,
}

impl GhCli {
    /// Client using `gh` from `PATH`. `GH_TOKEN` or `GITHUB_TOKEN` is passed
    /// through when set; otherwise `gh` uses its own login.
    pub fn new(timeout: Duration) -> Self {
        let token = std::env::var("GH_TOKEN")
            .or_else(|_| std::env::var("GITHUB_TOKEN"))
            .ok()
            .filter(|t| !t.is_empty());
        Self {
            program: PathBuf::from("gh"),
            token,
            timeout,
        }
    }

    /// Use a different executable
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.env("GH_PROMPT_DISABLED", "1")
            .env("GH_NO_UPDATE_NOTIFIER", "1")
            .env("NO_COLOR", "1");
        if let Some(token) = &self.token {
            cmd.env("GH_TOKEN", token);
        }
        cmd
    }

    /// Run `gh` with `args`, returning stdout.
    fn run(&self, args: &[&str]) -> Result<Vec<u8>, ClientError> {
        let label = args.first().copied().unwrap_or("gh");
        debug!(args = ?args, "running gh");

        let mut child = self
            .command()
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ClientError::Protocol(format!(
                    "{} executable not found",
                    self.program.display()
                )),
                _ => ClientError::Transient(format!("failed to spawn gh: {}", e)),
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait_with_timeout(&mut child, label)?;

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            return Err(classify_gh_failure(&String::from_utf8_lossy(&stderr)));
        }
        Ok(stdout)
    }

    fn wait_with_timeout(
        &self,
        child: &mut Child,
        label: &str,
    ) -> Result<std::process::ExitStatus, ClientError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ClientError::Transient(format!(
                        "gh {} timed out after {}s",
                        label,
                        self.timeout.as_secs()
                    )));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(ClientError::Transient(format!("waiting for gh: {}", e))),
            }
        }
    }

    fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T, ClientError> {
        let stdout = self.run(args)?;
        serde_json::from_slice(&stdout)
            .map_err(|e| ClientError::Protocol(format!("unexpected gh output: {}", e)))
    }
}

/// Read a pipe to the end on a background thread so the child never blocks
/// on a full pipe buffer.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Concatenate 1-based pages in order until a short page comes back.
/// The API lists newest first, so the result stays most-recent-first.
fn collect_pages<T, F>(per_page: usize, max_pages: u32, mut fetch: F) -> Result<Vec<T>, ClientError>
where
    F: FnMut(u32) -> Result<Vec<T>, ClientError>,
{
    let mut all = Vec::new();
    for page in 1..=max_pages {
        let batch = fetch(page)?;
        let done = batch.len() < per_page;
        all.extend(batch);
        if done {
            return Ok(all);
        }
    }
    warn!(pages = max_pages, items = all.len(), "listing truncated at page limit");
    Ok(all)
}

/// Map `gh` stderr onto the error taxonomy
fn classify_gh_failure(stderr: &str) -> ClientError {
    let message = stderr.trim().to_string();
    let lower = message.to_lowercase();

    let any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if any(&["rate limit", "http 429", "http 502", "http 503", "http 504", "http 500"])
        || any(&["timeout", "timed out", "connection", "eof", "tls handshake"])
    {
        ClientError::Transient(message)
    } else if any(&["http 401", "http 403", "bad credentials", "gh auth login", "authentication"]) {
        ClientError::Auth(message)
    } else if any(&["http 404", "not found"]) {
        ClientError::NotFound(message)
    } else {
        ClientError::Protocol(if message.is_empty() {
            "gh exited unsuccessfully".to_string()
        } else {
            message
        })
    }
}

impl SourceRepositoryClient for GhCli {
    fn list_releases(&self, repo: &str) -> Result<Vec<UpstreamRelease>, ClientError> {
        collect_pages(RELEASES_PER_PAGE, MAX_RELEASE_PAGES, |page| {
            let endpoint = format!(
                "/repos/{}/releases?per_page={}&page={}",
                repo, RELEASES_PER_PAGE, page
            );
            self.run_json(&["api", &endpoint])
        })
    }

    fn fetch_asset(
        &self,
        repo: &str,
        release_id: u64,
        asset_name: &str,
    ) -> Result<Vec<u8>, ClientError> {
        let release: UpstreamRelease =
            self.run_json(&["api", &format!("/repos/{}/releases/{}", repo, release_id)])?;

        let asset = release
            .assets
            .iter()
            .find(|a| a.name == asset_name)
            .ok_or_else(|| {
                ClientError::NotFound(format!(
                    "asset {} on release {} of {}",
                    asset_name, release_id, repo
                ))
            })?;

        self.run(&[
            "api",
            &format!("/repos/{}/releases/assets/{}", repo, asset.id),
            "-H",
            "Accept: application/octet-stream",
        ])
    }
}

impl ArtifactRepositoryClient for GhCli {
    fn create_release(
        &self,
        repo: &str,
        release: &NewRelease<'_>,
    ) -> Result<ReleaseRef, ClientError> {
        if !is_plain_file_name(release.asset_name) {
            return Err(ClientError::Protocol(format!(
                "asset name {:?} is not a plain file name",
                release.asset_name
            )));
        }
        let scratch = tempfile::tempdir()
            .map_err(|e| ClientError::Transient(format!("scratch dir: {}", e)))?;
        let asset_path = scratch.path().join(release.asset_name);
        let notes_path = scratch.path().join("notes.md");
        fs::write(&asset_path, release.artifact)
            .and_then(|_| fs::write(&notes_path, release.notes))
            .map_err(|e| ClientError::Transient(format!("writing release files: {}", e)))?;

        let asset_arg = asset_path.to_string_lossy();
        let notes_arg = notes_path.to_string_lossy();
        self.run(&[
            "release",
            "create",
            release.tag,
            &asset_arg,
            "--repo",
            repo,
            "--title",
            release.title,
            "--notes-file",
            &notes_arg,
        ])?;

        self.find_release(repo, release.tag)?.ok_or_else(|| {
            ClientError::Protocol(format!("release {} created but not visible", release.tag))
        })
    }

    fn mark_outdated(&self, repo: &str, tag: &str, new_title: &str) -> Result<(), ClientError> {
        self.run(&["release", "edit", tag, "--repo", repo, "--title", new_title])
            .map(|_| ())
    }

    fn find_release(&self, repo: &str, tag: &str) -> Result<Option<ReleaseRef>, ClientError> {
        let view: Result<GhReleaseView, _> = self.run_json(&[
            "release",
            "view",
            tag,
            "--repo",
            repo,
            "--json",
            "tagName,name,body,url",
        ]);
        match view {
            Ok(view) => Ok(Some(ReleaseRef {
                tag: view.tag_name,
                title: view.name,
                url: view.url,
                notes: view.body,
            })),
            Err(ClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
