//! S3 data-plane operations
//!
//! Every operation runs `s3cmd` inside the cluster container. Files move
//! between the host and the container through the work directory, which
//! the container sees as `/tmp/`.

use crate::engine::ContainerEngine;
use crate::error::{NanoError, Result};
use crate::identity::ClusterIdentity;
use crate::lifecycle::{blocking, CONTAINER_WORK_DIR};
use crate::prober;
use crate::relay;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// How `get` treats a file that already exists in the work directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GetMode {
    Force,
    #[default]
    SkipExisting,
    Continue,
}

impl GetMode {
    fn flag(self) -> &'static str {
        match self {
            Self::Force => "--force",
            Self::SkipExisting => "--skip-existing",
            Self::Continue => "--continue",
        }
    }
}

/// Build an `s3cmd` argv, appending `--debug` when asked.
pub fn s3cmd_argv<S: AsRef<str>>(verb: &str, args: &[S], debug: bool) -> Vec<String> {
    let mut argv = vec!["s3cmd".to_string(), verb.to_string()];
    argv.extend(args.iter().map(|a| a.as_ref().to_string()));
    if debug {
        argv.push("--debug".to_string());
    }
    argv
}

fn s3_url(path: &str) -> String {
    format!("s3://{}", path)
}

fn base_name(path: &str) -> Result<String> {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| NanoError::validation(format!("{} has no file name", path)))
}

/// S3 operations against one running cluster.
pub struct S3Relay {
    engine: Arc<dyn ContainerEngine>,
    identity: ClusterIdentity,
    debug: bool,
}

impl S3Relay {
    /// Check the cluster is running and bind to it.
    pub async fn connect(
        engine: Arc<dyn ContainerEngine>,
        identity: ClusterIdentity,
        debug: bool,
    ) -> Result<Self> {
        prober::require_running(engine.as_ref(), &identity).await?;
        Ok(Self {
            engine,
            identity,
            debug,
        })
    }

    async fn run(&self, verb: &str, args: &[String]) -> Result<String> {
        let argv = s3cmd_argv(verb, args, self.debug);
        debug!(cluster = %self.identity, argv = ?argv, "Running s3cmd");
        relay::exec(self.engine.as_ref(), &self.identity, &argv).await
    }

    /// Run and format as a one-line result.
    async fn run_summary(&self, verb: &str, args: &[String]) -> Result<String> {
        let output = self.run(verb, args).await?;
        Ok(format!(
            "{} on cluster {}",
            output.trim_end_matches('\n'),
            self.identity
        ))
    }

    async fn work_directory(&self) -> Result<PathBuf> {
        let details = self
            .engine
            .inspect_container(self.identity.canonical_name())
            .await?;
        details
            .work_directory()
            .map(PathBuf::from)
            .ok_or_else(|| NanoError::parse("container binds", "no work directory bind"))
    }

    pub async fn make_bucket(&self, bucket: &str) -> Result<String> {
        self.run_summary("mb", &[s3_url(bucket)]).await
    }

    pub async fn remove_bucket(&self, bucket: &str) -> Result<String> {
        self.run_summary("rb", &[s3_url(bucket)]).await
    }

    /// List buckets, or the objects of `bucket`.
    pub async fn list(&self, bucket: Option<&str>) -> Result<String> {
        let args: Vec<String> = bucket.map(s3_url).into_iter().collect();
        self.run("ls", &args).await
    }

    /// List every object of every bucket.
    ///
    /// Without any object `la` prints nothing, so the buckets are listed
    /// instead.
    pub async fn list_all(&self) -> Result<String> {
        let output = self.run("la", &[]).await?;
        if output.trim().is_empty() {
            return self.run("ls", &[]).await;
        }
        Ok(output)
    }

    /// Upload a host file.
    ///
    /// The file is copied into the work directory first unless a file with
    /// the same name is already there.
    pub async fn put(&self, file: &Path, bucket: &str) -> Result<String> {
        let base = base_name(&file.to_string_lossy())?;
        let staged = self.work_directory().await?.join(&base);

        if !staged.exists() {
            debug!(from = %file.display(), to = %staged.display(), "Staging file");
            fs::copy(file, &staged)?;
        }

        self.run_summary(
            "put",
            &[format!("{}{}", CONTAINER_WORK_DIR, base), s3_url(bucket)],
        )
        .await
    }

    /// Download an object into the work directory, then to `local` if given.
    ///
    /// When `local` is a directory the object keeps its name inside it.
    pub async fn get(&self, object: &str, local: Option<&Path>, mode: GetMode) -> Result<String> {
        let output = self
            .run_summary(
                "get",
                &[
                    mode.flag().to_string(),
                    s3_url(object),
                    CONTAINER_WORK_DIR.to_string(),
                ],
            )
            .await?;

        if let Some(local) = local {
            let base = base_name(object)?;
            let fetched = self.work_directory().await?.join(&base);
            let destination = if local.is_dir() {
                local.join(&base)
            } else {
                local.to_path_buf()
            };
            debug!(from = %fetched.display(), to = %destination.display(), "Copying object out");
            fs::copy(&fetched, &destination)?;
        }

        Ok(output)
    }

    pub async fn delete(&self, object: &str) -> Result<String> {
        self.run_summary("del", &[s3_url(object)]).await
    }

    pub async fn disk_usage(&self, prefix: &str) -> Result<String> {
        self.run_summary("du", &[s3_url(prefix)]).await
    }

    pub async fn info(&self, target: &str) -> Result<String> {
        self.run_summary("info", &[s3_url(target)]).await
    }

    pub async fn copy(&self, from: &str, to: &str) -> Result<String> {
        self.run_summary("cp", &[s3_url(from), s3_url(to)]).await
    }

    pub async fn move_object(&self, from: &str, to: &str) -> Result<String> {
        self.run_summary("mv", &[s3_url(from), s3_url(to)]).await
    }

    /// Synchronize a host directory tree into `bucket`.
    ///
    /// Anything but the work directory itself is copied into it first; the
    /// copy refuses to overwrite an existing directory there.
    pub async fn sync(&self, local_dir: &Path, bucket: &str) -> Result<String> {
        let work_dir = self.work_directory().await?;

        let source = if local_dir == work_dir {
            CONTAINER_WORK_DIR.to_string()
        } else {
            let base = base_name(&local_dir.to_string_lossy())?;
            let from = local_dir.to_path_buf();
            let to = work_dir.join(&base);
            blocking(move || copy_dir(&from, &to)).await?;
            format!("{}{}", CONTAINER_WORK_DIR, base)
        };

        self.run_summary("sync", &[source, s3_url(bucket)]).await
    }
}

/// Recursive copy that skips symlinks and refuses an existing destination.
fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    let meta = fs::metadata(src)?;
    if !meta.is_dir() {
        return Err(NanoError::validation(format!(
            "{} is not a directory",
            src.display()
        )));
    }
    if dst.exists() {
        return Err(NanoError::validation(format!(
            "{} already exists",
            dst.display()
        )));
    }

    fs::create_dir_all(dst)?;
    fs::set_permissions(dst, meta.permissions())?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = dst.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ContainerDetails, ContainerSummary, MockContainerEngine};
    use mockall::predicate::eq;

    fn running() -> ContainerSummary {
        ContainerSummary {
            names: vec!["/ceph-nano-alpha".into()],
            state: "running".into(),
            ..Default::default()
        }
    }

    fn engine_with_work_dir(work_dir: &Path) -> MockContainerEngine {
        let bind = format!("{}:/tmp/", work_dir.display());
        let mut engine = MockContainerEngine::new();
        engine
            .expect_list_containers()
            .returning(|_| Ok(vec![running()]));
        engine.expect_inspect_container().returning(move |_| {
            Ok(ContainerDetails {
                image: "ceph/daemon".into(),
                env: vec![],
                binds: vec![bind.clone()],
            })
        });
        engine
    }

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    async fn bound(engine: MockContainerEngine, debug: bool) -> S3Relay {
        S3Relay::connect(Arc::new(engine), ClusterIdentity::new("alpha"), debug)
            .await
            .unwrap()
    }

    #[test]
    fn test_argv_shapes() {
        assert_eq!(
            s3cmd_argv("mb", &["s3://bucket"], false),
            argv(&["s3cmd", "mb", "s3://bucket"])
        );
        assert_eq!(
            s3cmd_argv::<&str>("la", &[], true),
            argv(&["s3cmd", "la", "--debug"])
        );
    }

    #[tokio::test]
    async fn test_connect_refuses_stopped_cluster() {
        let mut engine = MockContainerEngine::new();
        engine.expect_list_containers().returning(|_| {
            let mut exited = running();
            exited.state = "exited".into();
            Ok(vec![exited])
        });
        engine.expect_exec().never();

        let result = S3Relay::connect(Arc::new(engine), ClusterIdentity::new("alpha"), false).await;
        assert!(matches!(result, Err(NanoError::ClusterNotRunning(_))));
    }

    #[tokio::test]
    async fn test_make_bucket_reports_cluster() {
        let mut engine = MockContainerEngine::new();
        engine
            .expect_list_containers()
            .returning(|_| Ok(vec![running()]));
        engine
            .expect_exec()
            .with(
                eq("ceph-nano-alpha"),
                eq(argv(&["s3cmd", "mb", "s3://photos", "--debug"])),
            )
            .times(1)
            .returning(|_, _| Ok("Bucket 's3://photos/' created\n".into()));

        let out = bound(engine, true).await.make_bucket("photos").await.unwrap();
        assert_eq!(out, "Bucket 's3://photos/' created on cluster alpha");
    }

    #[tokio::test]
    async fn test_put_skips_copy_when_staged() {
        let work = tempfile::tempdir().unwrap();
        std::fs::write(work.path().join("report.csv"), b"already staged").unwrap();
        let source = tempfile::tempdir().unwrap();
        let file = source.path().join("report.csv");
        std::fs::write(&file, b"fresh").unwrap();

        let mut engine = engine_with_work_dir(work.path());
        engine
            .expect_exec()
            .with(
                eq("ceph-nano-alpha"),
                eq(argv(&["s3cmd", "put", "/tmp/report.csv", "s3://docs"])),
            )
            .times(1)
            .returning(|_, _| Ok("upload: done\n".into()));

        bound(engine, false).await.put(&file, "docs").await.unwrap();

        let staged = std::fs::read(work.path().join("report.csv")).unwrap();
        assert_eq!(staged, b"already staged");
    }

    #[tokio::test]
    async fn test_put_stages_new_file() {
        let work = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        let file = source.path().join("image.png");
        std::fs::write(&file, b"png").unwrap();

        let mut engine = engine_with_work_dir(work.path());
        engine.expect_exec().times(1).returning(|_, _| Ok(String::new()));

        bound(engine, false).await.put(&file, "media").await.unwrap();
        assert_eq!(std::fs::read(work.path().join("image.png")).unwrap(), b"png");
    }

    #[tokio::test]
    async fn test_get_copies_into_local_directory() {
        let work = tempfile::tempdir().unwrap();
        std::fs::write(work.path().join("obj.txt"), b"payload").unwrap();
        let local = tempfile::tempdir().unwrap();

        let mut engine = engine_with_work_dir(work.path());
        engine
            .expect_exec()
            .with(
                eq("ceph-nano-alpha"),
                eq(argv(&["s3cmd", "get", "--force", "s3://bucket/obj.txt", "/tmp/"])),
            )
            .times(1)
            .returning(|_, _| Ok("download: done\n".into()));

        bound(engine, false)
            .await
            .get("bucket/obj.txt", Some(local.path()), GetMode::Force)
            .await
            .unwrap();

        assert_eq!(std::fs::read(local.path().join("obj.txt")).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_list_all_falls_back_to_ls() {
        let mut engine = MockContainerEngine::new();
        engine
            .expect_list_containers()
            .returning(|_| Ok(vec![running()]));
        engine.expect_exec().returning(|_, argv| match argv[1].as_str() {
            "la" => Ok("\n".into()),
            _ => Ok("2024-01-01 00:00  s3://photos\n".into()),
        });

        let out = bound(engine, false).await.list_all().await.unwrap();
        assert!(out.contains("s3://photos"));
    }

    #[tokio::test]
    async fn test_sync_copies_tree_into_work_dir() {
        let work = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        let tree = local.path().join("site");
        std::fs::create_dir_all(tree.join("css")).unwrap();
        std::fs::write(tree.join("index.html"), b"<html>").unwrap();
        std::fs::write(tree.join("css/main.css"), b"body{}").unwrap();

        let mut engine = engine_with_work_dir(work.path());
        engine
            .expect_exec()
            .with(
                eq("ceph-nano-alpha"),
                eq(argv(&["s3cmd", "sync", "/tmp/site", "s3://web"])),
            )
            .times(1)
            .returning(|_, _| Ok(String::new()));

        bound(engine, false).await.sync(&tree, "web").await.unwrap();
        assert!(work.path().join("site/css/main.css").is_file());
    }

    #[tokio::test]
    async fn test_sync_work_dir_in_place() {
        let work = tempfile::tempdir().unwrap();

        let mut engine = engine_with_work_dir(work.path());
        engine
            .expect_exec()
            .with(eq("ceph-nano-alpha"), eq(argv(&["s3cmd", "sync", "/tmp/", "s3://web"])))
            .times(1)
            .returning(|_, _| Ok(String::new()));

        bound(engine, false).await.sync(work.path(), "web").await.unwrap();
    }

    #[test]
    fn test_copy_dir_refuses_existing_destination() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        assert!(matches!(
            copy_dir(src.path(), dst.path()),
            Err(NanoError::Validation(_))
        ));
    }
}
