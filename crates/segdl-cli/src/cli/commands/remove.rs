//! `segdl remove <url> | --tag T` – delete downloads and their files.

use anyhow::{bail, Result};
use segdl_core::{EngineConfig, Scheduler};
use std::sync::Arc;

use super::open_store;

pub async fn run_remove(cfg: EngineConfig, url: Option<&str>, tag: Option<&str>) -> Result<()> {
    let store = open_store().await?;
    let scheduler = Scheduler::builder(cfg).store(Arc::new(store)).start();

    let outcome = remove(&scheduler, url, tag).await;
    scheduler.shutdown().await?;
    let removed = outcome?;
    println!("Removed {removed} download(s)");
    Ok(())
}

async fn remove(scheduler: &Scheduler, url: Option<&str>, tag: Option<&str>) -> Result<usize> {
    if let Some(tag) = tag {
        return Ok(scheduler.delete_by_tag(tag).await?);
    }
    let Some(url) = url else {
        bail!("nothing to remove: pass a url or --tag");
    };
    match scheduler.get(url).await? {
        Some(record) => {
            scheduler.delete(&record).await?;
            Ok(1)
        }
        None => bail!("no download recorded for {url}"),
    }
}
