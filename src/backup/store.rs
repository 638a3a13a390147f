// ABOUTME: Backup storage on the target host: archive, verify, list, remove, restore.
// ABOUTME: ShellBackupStore drives tar, gzip and the runtime CLI through RemoteShell.

use super::BackupError;
use crate::runtime::RuntimeType;
use crate::shell::{RemoteShell, quote, quote_path};
use async_trait::async_trait;

/// Where an archive's content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupSource {
    /// Contents of a host directory.
    HostDir(String),
    /// Several host directories in one tarball.
    HostDirs(Vec<String>),
    /// A directory copied out of a container.
    ContainerDir {
        runtime: RuntimeType,
        container: String,
        path: String,
    },
    /// Stdout of a command run inside a container.
    ContainerCommand {
        runtime: RuntimeType,
        container: String,
        command: String,
    },
    /// An image saved from the runtime's store.
    Image { runtime: RuntimeType, image: String },
}

/// A file in a backup directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFile {
    pub name: String,
    pub size: u64,
}

#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Write a gzip archive of `source` to `path`. Partial output never lands at `path`.
    async fn archive(&self, source: &BackupSource, path: &str) -> Result<(), BackupError>;

    /// Whether the archive at `path` decompresses (and lists, for tarballs) cleanly
    /// and holds something: an empty stream or an entry-less tarball fails.
    async fn verify(&self, path: &str, tar: bool) -> Result<bool, BackupError>;

    async fn size(&self, path: &str) -> Result<u64, BackupError>;

    /// Regular files directly under `dir`; empty when `dir` is missing.
    async fn list(&self, dir: &str) -> Result<Vec<ListedFile>, BackupError>;

    async fn remove(&self, path: &str) -> Result<(), BackupError>;

    /// Replace `into` with the archive's contents. The previous contents are
    /// kept beside it as `<into>.pre-restore`.
    async fn restore(&self, path: &str, into: &str) -> Result<(), BackupError>;
}

pub struct ShellBackupStore<S> {
    shell: S,
}

impl<S: RemoteShell> ShellBackupStore<S> {
    pub fn new(shell: S) -> Self {
        Self { shell }
    }
}

fn parent(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) => "/",
        Some((dir, _)) => dir,
        None => ".",
    }
}

/// Uncompressed content of `source` on stdout. Always a single command, so its
/// exit status is the source's own.
fn source_command(source: &BackupSource) -> String {
    match source {
        BackupSource::HostDir(dir) => format!("tar -cf - -C {} .", quote_path(dir)),
        BackupSource::HostDirs(dirs) => {
            let dirs: Vec<String> = dirs.iter().map(|d| quote_path(d)).collect();
            format!("tar -cf - {}", dirs.join(" "))
        }
        BackupSource::ContainerDir {
            runtime,
            container,
            path,
        } => format!(
            "{} cp {}:{} -",
            runtime.binary(),
            quote(container),
            quote(path)
        ),
        BackupSource::ContainerCommand {
            runtime,
            container,
            command,
        } => format!(
            "{} exec {} sh -c {}",
            runtime.binary(),
            quote(container),
            quote(command)
        ),
        BackupSource::Image { runtime, image } => {
            format!("{} save {}", runtime.binary(), quote(image))
        }
    }
}

#[async_trait]
impl<S: RemoteShell> BackupStore for ShellBackupStore<S> {
    async fn archive(&self, source: &BackupSource, path: &str) -> Result<(), BackupError> {
        let target = quote_path(path);
        let raw = quote_path(&format!("{}.raw", path));
        let partial = quote_path(&format!("{}.partial", path));
        tracing::debug!(%path, ?source, "writing archive");
        // The source runs alone into a scratch file; a failed or empty source
        // stops the chain before gzip can wrap it into a valid archive.
        self.shell
            .run_checked(&format!(
                "mkdir -p {dir} && {src} > {raw} && [ -s {raw} ] && gzip -c {raw} > {partial} && mv -f {partial} {target}; status=$?; rm -f {raw} {partial}; exit $status",
                dir = quote_path(parent(path)),
                src = source_command(source),
                raw = raw,
                partial = partial,
                target = target
            ))
            .await?;
        Ok(())
    }

    async fn verify(&self, path: &str, tar: bool) -> Result<bool, BackupError> {
        let p = quote_path(path);
        let command = if tar {
            format!(
                "gzip -t {p} 2>/dev/null && tar -tzf {p} >/dev/null 2>&1 && [ -n \"$(tar -tzf {p} 2>/dev/null | head -n 1)\" ]"
            )
        } else {
            format!("gzip -t {p} 2>/dev/null && [ $(gzip -dc {p} 2>/dev/null | head -c 1 | wc -c) -gt 0 ]")
        };
        Ok(self.shell.run(&command).await?.success())
    }

    async fn size(&self, path: &str) -> Result<u64, BackupError> {
        let out = self
            .shell
            .run_checked(&format!("wc -c < {}", quote_path(path)))
            .await?;
        out.trim().parse().map_err(|_| BackupError::Listing {
            dir: path.to_string(),
            reason: format!("unexpected size output {:?}", out.trim()),
        })
    }

    async fn list(&self, dir: &str) -> Result<Vec<ListedFile>, BackupError> {
        let out = self
            .shell
            .run_checked(&format!(
                "for f in {}/*; do if [ -f \"$f\" ]; then printf '%s\\t%s\\n' \"$(wc -c < \"$f\")\" \"${{f##*/}}\"; fi; done",
                quote_path(dir.trim_end_matches('/'))
            ))
            .await?;
        parse_listing(&out).map_err(|reason| BackupError::Listing {
            dir: dir.to_string(),
            reason,
        })
    }

    async fn remove(&self, path: &str) -> Result<(), BackupError> {
        self.shell
            .run_checked(&format!("rm -f {}", quote_path(path)))
            .await?;
        Ok(())
    }

    async fn restore(&self, path: &str, into: &str) -> Result<(), BackupError> {
        let into = into.trim_end_matches('/');
        let aside = quote_path(&format!("{}.pre-restore", into));
        let into_q = quote_path(into);
        self.shell
            .run_checked(&format!(
                "if [ -e {into} ]; then rm -rf {aside} && mv {into} {aside}; fi && mkdir -p {into} && tar -xzf {archive} -C {into} --strip-components=1",
                into = into_q,
                aside = aside,
                archive = quote_path(path)
            ))
            .await?;
        Ok(())
    }
}

fn parse_listing(out: &str) -> Result<Vec<ListedFile>, String> {
    out.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            let (size, name) = line
                .split_once('\t')
                .ok_or_else(|| format!("malformed listing line {:?}", line))?;
            let size = size
                .trim()
                .parse()
                .map_err(|_| format!("malformed size in {:?}", line))?;
            Ok(ListedFile {
                name: name.to_string(),
                size,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_parses_size_and_name() {
        let files = parse_listing("  120\tdata-20260101-000000.tar.gz\n7\tnotes.txt\n").unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].size, 120);
        assert_eq!(files[1].name, "notes.txt");
    }

    #[test]
    fn container_sources_use_runtime_binary() {
        let cmd = source_command(&BackupSource::ContainerDir {
            runtime: RuntimeType::Podman,
            container: "shop-blue".to_string(),
            path: "/app/data".to_string(),
        });
        assert_eq!(cmd, "podman cp 'shop-blue':'/app/data' -");
    }

    #[test]
    fn parent_of_paths() {
        assert_eq!(parent("/b/data/x.tar.gz"), "/b/data");
        assert_eq!(parent("/x"), "/");
    }
}
