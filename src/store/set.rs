use super::{Store, StoreKind};
use crate::config::StoreConfig;
use crate::domain::Domain;
use crate::error::{Error, Result};
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// The four stores of one deployment, rooted in a shared data directory.
#[derive(Debug, Clone)]
pub struct StoreSet {
    data_dir: PathBuf,
    pub suspect: Store,
    pub whitelist: Store,
    pub blacklist: Store,
    pub final_list: Store,
}

/// Where a domain currently lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub suspect: bool,
    pub whitelist: bool,
    pub blacklist: bool,
    pub final_list: bool,
}

impl StoreSet {
    pub fn from_config(config: &StoreConfig) -> Self {
        let dir = &config.data_dir;
        Self {
            data_dir: dir.clone(),
            suspect: Store::new(StoreKind::Suspect, dir.join(&config.suspect)),
            whitelist: Store::new(StoreKind::Whitelist, dir.join(&config.whitelist)),
            blacklist: Store::new(StoreKind::Blacklist, dir.join(&config.blacklist)),
            final_list: Store::new(StoreKind::Final, dir.join(&config.final_list)),
        }
    }

    /// Stores with the default file names under `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let config = StoreConfig {
            data_dir: dir.into(),
            ..StoreConfig::default()
        };
        Self::from_config(&config)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir).map_err(|source| Error::Store {
            name: "data_dir",
            path: self.data_dir.clone(),
            source,
        })
    }

    /// Whitelist ∪ Blacklist ∪ Suspect ∪ parsed(Final).
    ///
    /// Cost is proportional to the total size of all stores; Final is
    /// usually by far the largest.
    pub fn load_union(&self) -> Result<FxHashSet<Domain>> {
        let mut all = self.final_list.load()?;
        all.extend(self.whitelist.load()?);
        all.extend(self.blacklist.load()?);
        all.extend(self.suspect.load()?);
        Ok(all)
    }

    pub fn locate(&self, domain: &Domain) -> Result<Placement> {
        Ok(Placement {
            suspect: self.suspect.contains(domain)?,
            whitelist: self.whitelist.contains(domain)?,
            blacklist: self.blacklist.contains(domain)?,
            final_list: self.final_list.contains(domain)?,
        })
    }

    /// Manual override: mark `domain` safe.
    ///
    /// The target list is written first so an interrupted move leaves the
    /// domain in two stores (settled on the next arbiter pass) rather than
    /// in none.
    pub fn allow(&self, domain: &Domain) -> Result<()> {
        self.whitelist.append(domain)?;
        self.suspect.remove(domain)?;
        self.blacklist.remove(domain)?;
        info!("{} moved to whitelist", domain);
        Ok(())
    }

    /// Manual override: mark `domain` unsafe.
    pub fn block(&self, domain: &Domain) -> Result<()> {
        self.blacklist.append(domain)?;
        self.suspect.remove(domain)?;
        self.whitelist.remove(domain)?;
        info!("{} moved to blacklist", domain);
        Ok(())
    }

    /// Drops every local decision about `domain`. Final is left alone; it
    /// changes on the next reconcile.
    pub fn forget(&self, domain: &Domain) -> Result<bool> {
        let mut removed = self.suspect.remove(domain)?;
        removed |= self.whitelist.remove(domain)?;
        removed |= self.blacklist.remove(domain)?;
        if removed {
            info!("{} returned to unclassified", domain);
        }
        Ok(removed)
    }
}
