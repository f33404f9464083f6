//! S3 commands relayed to s3cmd inside a cluster

use anyhow::Result;
use nano_lib::{ClusterIdentity, GetMode, S3Relay};

use crate::output::print_info;
use crate::S3Commands;

async fn connect(cluster: String, debug: bool) -> Result<S3Relay> {
    let relay = S3Relay::connect(super::engine()?, ClusterIdentity::new(cluster), debug).await?;
    Ok(relay)
}

/// Pick the download mode; `--force` beats `--continue`.
fn get_mode(force: bool, resume: bool) -> GetMode {
    if force {
        GetMode::Force
    } else if resume {
        GetMode::Continue
    } else {
        GetMode::SkipExisting
    }
}

pub async fn run(cmd: S3Commands) -> Result<()> {
    let output = match cmd {
        S3Commands::Mb {
            cluster,
            bucket,
            debug,
        } => connect(cluster, debug).await?.make_bucket(&bucket).await?,
        S3Commands::Rb {
            cluster,
            bucket,
            debug,
        } => connect(cluster, debug).await?.remove_bucket(&bucket).await?,
        S3Commands::Ls {
            cluster,
            bucket,
            debug,
        } => connect(cluster, debug).await?.list(bucket.as_deref()).await?,
        S3Commands::La { cluster, debug } => connect(cluster, debug).await?.list_all().await?,
        S3Commands::Put {
            cluster,
            file,
            bucket,
            debug,
        } => connect(cluster, debug).await?.put(&file, &bucket).await?,
        S3Commands::Get {
            cluster,
            object,
            local,
            skip: _,
            force,
            resume,
            debug,
        } => {
            connect(cluster, debug)
                .await?
                .get(&object, local.as_deref(), get_mode(force, resume))
                .await?
        }
        S3Commands::Del {
            cluster,
            object,
            debug,
        } => connect(cluster, debug).await?.delete(&object).await?,
        S3Commands::Du {
            cluster,
            prefix,
            debug,
        } => connect(cluster, debug).await?.disk_usage(&prefix).await?,
        S3Commands::Info {
            cluster,
            target,
            debug,
        } => connect(cluster, debug).await?.info(&target).await?,
        S3Commands::Cp {
            cluster,
            from,
            to,
            debug,
        } => connect(cluster, debug).await?.copy(&from, &to).await?,
        S3Commands::Mv {
            cluster,
            from,
            to,
            debug,
        } => connect(cluster, debug).await?.move_object(&from, &to).await?,
        S3Commands::Sync {
            cluster,
            local_dir,
            bucket,
            debug,
        } => {
            let relay = connect(cluster, debug).await?;
            print_info(&format!(
                "Syncing directory '{}' in the '{}' bucket...",
                local_dir.display(),
                bucket
            ));
            relay.sync(&local_dir, &bucket).await?
        }
    };

    if !output.is_empty() {
        println!("{}", output.trim_end_matches('\n'));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_mode_precedence() {
        assert_eq!(get_mode(false, false), GetMode::SkipExisting);
        assert_eq!(get_mode(false, true), GetMode::Continue);
        assert_eq!(get_mode(true, true), GetMode::Force);
        assert_eq!(get_mode(true, false), GetMode::Force);
    }
}
