use std::fs;
use std::path::Path;
use std::process::Command;

use tracing::instrument;

use super::error::SourceResolverError;

/// Username/password pair resolved either from a named `Source`'s
/// `SecretStore` entry or from the process-wide `VCS_USERNAME`/`VCS_PASSWORD`
/// defaults, per spec.md §4.4.
pub struct ResolveCredentials {
    pub username: String,
    pub password: String,
    /// Single-file CA bundle contents, if the source names a `ca_cert`.
    pub ca_cert_pem: Option<String>,
}

pub struct SourceResolver {
    default_ca_path: String,
}

impl SourceResolver {
    pub fn new(default_ca_path: String) -> Self {
        Self { default_ca_path }
    }

    /// Resolves `branch` on `clone_url` to a concrete commit hash. Every call
    /// gets a freshly created temp directory that scopes the git credential
    /// file, the CA file, and the shallow clone; `HOME` is overridden to it
    /// for the lifetime of the git invocations so concurrent resolvers never
    /// share `~/.git-credentials`, per Design Notes §9.
    #[instrument(skip(self, credentials))]
    pub fn resolve_commit(
        &self,
        clone_url: &str,
        branch: &str,
        credentials: &ResolveCredentials,
    ) -> Result<String, SourceResolverError> {
        let scratch = tempfile::tempdir()?;
        let home = scratch.path();

        self.write_git_credentials(home, clone_url, credentials)?;
        let ca_path = self.materialize_ca(home, credentials)?;

        let envs = self.scoped_envs(home, &ca_path);

        self.run_git(home, &envs, &["config", "--global", "credential.helper", "store"])?;

        let repo_dir = home.join("repo");
        self.run_git(
            home,
            &envs,
            &[
                "clone",
                "--depth",
                "1",
                "--branch",
                branch,
                clone_url,
                repo_dir.to_str().unwrap_or_default(),
            ],
        )?;

        let output = Command::new("git")
            .current_dir(&repo_dir)
            .envs(envs.clone())
            .args(["rev-parse", "HEAD"])
            .output()?;

        if !output.status.success() {
            return Err(SourceResolverError::BranchConversion(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn write_git_credentials(
        &self,
        home: &Path,
        clone_url: &str,
        credentials: &ResolveCredentials,
    ) -> Result<(), SourceResolverError> {
        let entry = format!(
            "https://{}:{}@{}\n",
            credentials.username,
            credentials.password,
            clone_url.trim_start_matches("https://")
        );
        fs::write(home.join(".git-credentials"), entry)?;
        Ok(())
    }

    fn materialize_ca(
        &self,
        home: &Path,
        credentials: &ResolveCredentials,
    ) -> Result<String, SourceResolverError> {
        match &credentials.ca_cert_pem {
            Some(pem) => {
                let path = home.join("ca.pem");
                fs::write(&path, pem)?;
                Ok(path.to_string_lossy().to_string())
            }
            None => Ok(self.default_ca_path.clone()),
        }
    }

    fn scoped_envs(&self, home: &Path, ca_path: &str) -> Vec<(String, String)> {
        vec![
            ("HOME".to_string(), home.to_string_lossy().to_string()),
            ("GIT_SSL_CAINFO".to_string(), ca_path.to_string()),
            ("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()),
        ]
    }

    fn run_git(
        &self,
        cwd: &Path,
        envs: &[(String, String)],
        args: &[&str],
    ) -> Result<(), SourceResolverError> {
        // Inherits the process environment (for PATH et al.) and layers the
        // per-call overrides on top, rather than mutating it globally.
        let output = Command::new("git")
            .current_dir(cwd)
            .envs(envs.iter().cloned())
            .args(args)
            .output()?;
        if !output.status.success() {
            return Err(SourceResolverError::BranchConversion(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_envs_overrides_home_per_call() {
        let resolver = SourceResolver::new("/etc/ssl/certs/ca-bundle.crt".to_string());
        let a = resolver.scoped_envs(Path::new("/tmp/a"), "/etc/ssl/certs/ca-bundle.crt");
        let b = resolver.scoped_envs(Path::new("/tmp/b"), "/etc/ssl/certs/ca-bundle.crt");
        assert_ne!(a, b);
        assert!(a.iter().any(|(k, v)| k == "HOME" && v == "/tmp/a"));
    }

    #[test]
    fn materialize_ca_falls_back_to_default_path() {
        let resolver = SourceResolver::new("/default/ca.pem".to_string());
        let creds = ResolveCredentials {
            username: "u".into(),
            password: "p".into(),
            ca_cert_pem: None,
        };
        let scratch = tempfile::tempdir().unwrap();
        let path = resolver.materialize_ca(scratch.path(), &creds).unwrap();
        assert_eq!(path, "/default/ca.pem");
    }

    #[test]
    fn materialize_ca_writes_scoped_file_when_present() {
        let resolver = SourceResolver::new("/default/ca.pem".to_string());
        let creds = ResolveCredentials {
            username: "u".into(),
            password: "p".into(),
            ca_cert_pem: Some("-----BEGIN CERTIFICATE-----\n".into()),
        };
        let scratch = tempfile::tempdir().unwrap();
        let path = resolver.materialize_ca(scratch.path(), &creds).unwrap();
        assert!(path.starts_with(scratch.path().to_str().unwrap()));
        assert!(fs::read_to_string(path).unwrap().contains("BEGIN CERTIFICATE"));
    }
}
