//! Per-collection and per-item counts and stored bytes, printable as a table
//! or exportable as CSV with a trailing total row.

use std::fmt;
use std::io;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::contract::{Collection, Repository, Session};
use crate::error::IngestError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStats {
    pub id: String,
    pub name: String,
    pub item_count: usize,
    /// Sum of the primary bitstream size of every item.
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryStats {
    pub collections: Vec<CollectionStats>,
}

impl RepositoryStats {
    pub fn total_items(&self) -> usize {
        self.collections.iter().map(|c| c.item_count).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.collections.iter().map(|c| c.total_bytes).sum()
    }
}

#[derive(Serialize)]
struct CollectionRow<'a> {
    #[serde(rename = "Collection Name")]
    name: &'a str,
    #[serde(rename = "Collection ID")]
    id: &'a str,
    #[serde(rename = "Number of Documents")]
    item_count: usize,
    #[serde(rename = "Total Size (Bytes)")]
    total_bytes: u64,
}

impl RepositoryStats {
    /// One row per collection followed by a `Total` row.
    pub fn write_csv<W: io::Write>(&self, out: W) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_writer(out);
        for c in &self.collections {
            writer.serialize(CollectionRow {
                name: &c.name,
                id: &c.id,
                item_count: c.item_count,
                total_bytes: c.total_bytes,
            })?;
        }
        writer.serialize(CollectionRow {
            name: "Total",
            id: "",
            item_count: self.total_items(),
            total_bytes: self.total_bytes(),
        })?;
        writer.flush()?;
        Ok(())
    }
}

impl fmt::Display for RepositoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<40} {:<36} {:>10} {:>16}",
            "Collection Name", "Collection ID", "Documents", "Total Size (B)"
        )?;
        for c in &self.collections {
            writeln!(
                f,
                "{:<40} {:<36} {:>10} {:>16}",
                c.name, c.id, c.item_count, c.total_bytes
            )?;
        }
        write!(
            f,
            "{:<40} {:<36} {:>10} {:>16}",
            "Total",
            "",
            self.total_items(),
            self.total_bytes()
        )
    }
}

pub async fn collection_stats<R>(
    repo: &R,
    session: &Session,
    collection: &Collection,
) -> Result<CollectionStats, IngestError>
where
    R: Repository + ?Sized,
{
    let items = repo.list_items(&collection.id, session).await?;
    let total_bytes = items
        .iter()
        .filter_map(|item| item.primary_bitstream())
        .map(|b| b.size_bytes)
        .sum();
    Ok(CollectionStats {
        id: collection.id.clone(),
        name: collection.display_name().to_string(),
        item_count: items.len(),
        total_bytes,
    })
}

/// Stats for every collection. Collections whose items cannot be listed are left out.
pub async fn repository_stats<R>(repo: &R, session: &Session) -> Result<RepositoryStats, IngestError>
where
    R: Repository + ?Sized,
{
    let collections = repo.list_collections(session).await?;
    let mut stats = RepositoryStats::default();
    for collection in &collections {
        match collection_stats(repo, session, collection).await {
            Ok(row) => stats.collections.push(row),
            Err(e) => {
                warn!(collection_id = %collection.id, error = %e, "[STATS] Skipping collection")
            }
        }
    }
    info!(
        collections = stats.collections.len(),
        items = stats.total_items(),
        bytes = stats.total_bytes(),
        "[STATS] Repository statistics collected"
    );
    Ok(stats)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStats {
    pub id: String,
    pub name: String,
    /// Name of the primary bitstream; empty when the item has none.
    pub file_name: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemStatsTable {
    pub items: Vec<ItemStats>,
}

#[derive(Serialize)]
struct ItemRow<'a> {
    uuid: &'a str,
    name: &'a str,
    name_file: &'a str,
    #[serde(rename = "size_Bytes")]
    size_bytes: u64,
}

impl ItemStatsTable {
    pub fn total_bytes(&self) -> u64 {
        self.items.iter().map(|i| i.size_bytes).sum()
    }

    /// One row per item followed by a row carrying the document count and total size.
    pub fn write_csv<W: io::Write>(&self, out: W) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_writer(out);
        for item in &self.items {
            writer.serialize(ItemRow {
                uuid: &item.id,
                name: &item.name,
                name_file: &item.file_name,
                size_bytes: item.size_bytes,
            })?;
        }
        let count = self.items.len().to_string();
        writer.serialize(ItemRow {
            uuid: "Total documents",
            name: &count,
            name_file: "Total size Bytes",
            size_bytes: self.total_bytes(),
        })?;
        writer.flush()?;
        Ok(())
    }
}

impl fmt::Display for ItemStatsTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<36} {:<40} {:<40} {:>14}", "Item ID", "Name", "File", "Size (B)")?;
        for i in &self.items {
            writeln!(f, "{:<36} {:<40} {:<40} {:>14}", i.id, i.name, i.file_name, i.size_bytes)?;
        }
        write!(
            f,
            "{:<36} {:<40} {:<40} {:>14}",
            "Total",
            self.items.len(),
            "",
            self.total_bytes()
        )
    }
}

/// Stats for up to `limit` repository items, fetching `concurrency` items at a time.
///
/// An item that cannot be fetched keeps its row with no file and zero bytes.
pub async fn item_stats<R>(
    repo: &R,
    session: &Session,
    limit: Option<usize>,
    concurrency: usize,
) -> Result<ItemStatsTable, IngestError>
where
    R: Repository + ?Sized,
{
    let listed = repo.list_repository_items(session, limit).await?;
    let items: Vec<ItemStats> = stream::iter(listed)
        .map(|item| async move {
            let name = item.name.clone().unwrap_or_default();
            match repo.get_item(&item.id, session).await {
                Ok(full) => {
                    let primary = full.primary_bitstream();
                    ItemStats {
                        id: item.id,
                        name,
                        file_name: primary.map(|b| b.file_name().to_string()).unwrap_or_default(),
                        size_bytes: primary.map_or(0, |b| b.size_bytes),
                    }
                }
                Err(e) => {
                    warn!(item_id = %item.id, error = %e, "[STATS] Could not fetch item");
                    ItemStats {
                        id: item.id,
                        name,
                        file_name: String::new(),
                        size_bytes: 0,
                    }
                }
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let table = ItemStatsTable { items };
    info!(items = table.items.len(), bytes = table.total_bytes(), "[STATS] Item statistics collected");
    Ok(table)
}
