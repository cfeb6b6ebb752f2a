//! SQLite-backed address pool store.
//!
//! Three tables:
//! - `label_map`: pool label → configured range text
//! - `ipaddress_range`: one row per address per pool, with status and owning reference
//! - `a_records`: DNS bindings (address, hostname) per pool
//!
//! Every mutation that touches more than one row runs inside a transaction.
//! The store is only ever driven from the coordinator's loop, so the mutex is
//! uncontended in practice.

use crate::error::{RangeError, StoreError};
use crate::range::expand_range;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS label_map (
    ipam_label TEXT PRIMARY KEY,
    range      TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS ipaddress_range (
    ipaddress  TEXT NOT NULL,
    ordinal    INTEGER NOT NULL,
    status     INTEGER NOT NULL,
    ipam_label TEXT NOT NULL,
    reference  TEXT NOT NULL,
    PRIMARY KEY (ipam_label, ipaddress),
    UNIQUE (ipam_label, reference)
);
CREATE INDEX IF NOT EXISTS ipaddress_range_available
    ON ipaddress_range (ipam_label, status, ordinal);
CREATE TABLE IF NOT EXISTS a_records (
    ipaddress  TEXT NOT NULL,
    hostname   TEXT NOT NULL,
    ipam_label TEXT NOT NULL,
    PRIMARY KEY (ipam_label, ipaddress, hostname)
);
";

/// Allocation state of a pool address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressStatus {
    /// Bound to the row's reference
    Allocated,
    /// Free; the reference is a placeholder token
    Available,
}

impl AddressStatus {
    fn code(self) -> i64 {
        match self {
            AddressStatus::Allocated => 0,
            AddressStatus::Available => 1,
        }
    }

    fn from_code(code: i64) -> Self {
        if code == 0 {
            AddressStatus::Allocated
        } else {
            AddressStatus::Available
        }
    }
}

/// One address row of a pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEntry {
    pub address: Ipv4Addr,
    /// Label of the pool the row belongs to
    pub pool: String,
    pub status: AddressStatus,
    /// Owning binding while allocated, a fresh random token otherwise
    pub reference: String,
}

/// Outcome of asking for one specific address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExactAllocation {
    /// The address was available and is now bound to the reference
    Allocated,
    /// The address was already bound to the same reference
    AlreadyBound,
    /// The address is bound to a different reference
    Conflict,
    /// The reference already owns a different address in this pool
    ReferenceBound(Ipv4Addr),
    /// The pool has no such address
    NotInPool,
}

/// What pool reconciliation did, per label
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub kept: Vec<String>,
    pub replaced: Vec<String>,
    pub removed: Vec<String>,
    pub added: Vec<String>,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kept={:?} replaced={:?} removed={:?} added={:?}",
            self.kept, self.replaced, self.removed, self.added
        )
    }
}

/// Persistent address pool store
#[derive(Debug)]
pub struct PoolStore {
    conn: Mutex<Connection>,
}

impl PoolStore {
    /// Open (or create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        debug!("Opened address pool store at {}", path.display());
        Self::init(conn)
    }

    /// Store that lives only as long as the process
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Persisted pool definitions, label → range text
    pub fn pools(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT ipam_label, range FROM label_map")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        Ok(rows.collect::<Result<BTreeMap<_, _>, _>>()?)
    }

    /// Reconcile persisted pools against the configured ones.
    ///
    /// A pool whose range text is unchanged is left alone. A changed or
    /// removed pool loses every address row and DNS binding; a changed pool is
    /// then re-inserted fully available. All ranges are validated before
    /// anything is written, and the whole sync commits atomically.
    pub fn sync_pools(&self, desired: &BTreeMap<String, String>) -> Result<SyncReport, StoreError> {
        let expanded = desired
            .iter()
            .map(|(label, range)| Ok((label.as_str(), (range.as_str(), expand_range(range)?))))
            .collect::<Result<BTreeMap<&str, (&str, Vec<Ipv4Addr>)>, RangeError>>()?;

        let persisted = self.pools()?;
        let mut report = SyncReport::default();

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for (label, range) in &persisted {
            match desired.get(label) {
                Some(wanted) if wanted == range => report.kept.push(label.clone()),
                Some(_) => {
                    cascade_delete(&tx, label)?;
                    report.replaced.push(label.clone());
                }
                None => {
                    cascade_delete(&tx, label)?;
                    report.removed.push(label.clone());
                }
            }
        }

        for (label, (range, addresses)) in &expanded {
            if report.kept.iter().any(|k| k == label) {
                continue;
            }
            tx.execute(
                "INSERT INTO label_map (ipam_label, range) VALUES (?1, ?2)",
                params![label, range],
            )?;
            let mut insert = tx.prepare(
                "INSERT INTO ipaddress_range (ipaddress, ordinal, status, ipam_label, reference)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for addr in addresses {
                insert.execute(params![
                    addr.to_string(),
                    i64::from(u32::from(*addr)),
                    AddressStatus::Available.code(),
                    label,
                    fresh_reference(),
                ])?;
            }
            if !persisted.contains_key(*label) {
                report.added.push((*label).to_string());
            }
        }

        tx.commit()?;
        info!("Address pools synchronized: {}", report);
        Ok(report)
    }

    /// Whether a pool with this label is configured
    pub fn has_pool(&self, pool: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM label_map WHERE ipam_label = ?1",
                params![pool],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Address currently allocated to `reference` in `pool`
    pub fn lookup(&self, pool: &str, reference: &str) -> Result<Option<Ipv4Addr>, StoreError> {
        let conn = self.conn()?;
        lookup_in(&conn, pool, reference)
    }

    /// Allocate the lowest available address of `pool` to `reference`.
    ///
    /// Returns the address the reference already owns if there is one, and
    /// `None` when the pool is exhausted.
    pub fn allocate_next(&self, pool: &str, reference: &str) -> Result<Option<Ipv4Addr>, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if let Some(addr) = lookup_in(&tx, pool, reference)? {
            return Ok(Some(addr));
        }

        let next: Option<String> = tx
            .query_row(
                "SELECT ipaddress FROM ipaddress_range
                 WHERE ipam_label = ?1 AND status = ?2
                 ORDER BY ordinal ASC LIMIT 1",
                params![pool, AddressStatus::Available.code()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(next) = next else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE ipaddress_range SET status = ?1, reference = ?2
             WHERE ipam_label = ?3 AND ipaddress = ?4",
            params![AddressStatus::Allocated.code(), reference, pool, next],
        )?;
        tx.commit()?;

        Ok(Some(parse_addr(&next)?))
    }

    /// Allocate exactly `address` in `pool` to `reference`
    pub fn allocate_exact(
        &self,
        pool: &str,
        address: Ipv4Addr,
        reference: &str,
    ) -> Result<ExactAllocation, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let Some(entry) = entry_in(&tx, pool, address)? else {
            return Ok(ExactAllocation::NotInPool);
        };

        match entry.status {
            AddressStatus::Allocated if entry.reference == reference => {
                return Ok(ExactAllocation::AlreadyBound);
            }
            AddressStatus::Allocated => return Ok(ExactAllocation::Conflict),
            AddressStatus::Available => {}
        }

        if let Some(owned) = lookup_in(&tx, pool, reference)? {
            return Ok(ExactAllocation::ReferenceBound(owned));
        }

        let updated = tx.execute(
            "UPDATE ipaddress_range SET status = ?1, reference = ?2
             WHERE ipam_label = ?3 AND ipaddress = ?4 AND status = ?5",
            params![
                AddressStatus::Allocated.code(),
                reference,
                pool,
                address.to_string(),
                AddressStatus::Available.code()
            ],
        )?;
        tx.commit()?;

        Ok(if updated == 1 {
            ExactAllocation::Allocated
        } else {
            ExactAllocation::Conflict
        })
    }

    /// Return `address` to the pool under a fresh reference.
    ///
    /// Returns whether an allocated row was released.
    pub fn release(&self, pool: &str, address: Ipv4Addr) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE ipaddress_range SET status = ?1, reference = ?2
             WHERE ipam_label = ?3 AND ipaddress = ?4 AND status = ?5",
            params![
                AddressStatus::Available.code(),
                fresh_reference(),
                pool,
                address.to_string(),
                AddressStatus::Allocated.code()
            ],
        )?;
        Ok(updated > 0)
    }

    /// Record a DNS binding; recording an existing one is a no-op
    pub fn create_dns_record(&self, pool: &str, hostname: &str, address: Ipv4Addr) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO a_records (ipaddress, hostname, ipam_label) VALUES (?1, ?2, ?3)",
            params![address.to_string(), hostname, pool],
        )?;
        Ok(())
    }

    /// Remove a DNS binding, returning whether one existed
    pub fn delete_dns_record(&self, pool: &str, hostname: &str, address: Ipv4Addr) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM a_records WHERE ipam_label = ?1 AND ipaddress = ?2 AND hostname = ?3",
            params![pool, address.to_string(), hostname],
        )?;
        Ok(deleted > 0)
    }

    /// DNS bindings of a pool as (hostname, address)
    pub fn dns_records(&self, pool: &str) -> Result<Vec<(String, Ipv4Addr)>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT hostname, ipaddress FROM a_records WHERE ipam_label = ?1 ORDER BY hostname",
        )?;
        let rows = stmt.query_map(params![pool], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        rows.map(|row| -> Result<(String, Ipv4Addr), StoreError> {
            let (host, addr) = row?;
            Ok((host, parse_addr(&addr)?))
        })
        .collect()
    }

    /// A single pool row
    pub fn entry(&self, pool: &str, address: Ipv4Addr) -> Result<Option<PoolEntry>, StoreError> {
        let conn = self.conn()?;
        entry_in(&conn, pool, address)
    }

    /// All rows of a pool, lowest address first
    pub fn entries(&self, pool: &str) -> Result<Vec<PoolEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT ipaddress, ipam_label, status, reference FROM ipaddress_range
             WHERE ipam_label = ?1 ORDER BY ordinal",
        )?;
        let rows = stmt.query_map(params![pool], raw_entry)?;
        rows.map(|row| -> Result<PoolEntry, StoreError> { row?.into_entry() })
            .collect()
    }

    /// Dump the address table at debug level
    pub fn log_table(&self) -> Result<(), StoreError> {
        for (pool, _) in self.pools()? {
            for entry in self.entries(&pool)? {
                debug!(
                    pool = %entry.pool,
                    address = %entry.address,
                    status = ?entry.status,
                    reference = %entry.reference,
                    "pool entry"
                );
            }
        }
        Ok(())
    }
}

struct RawEntry {
    address: String,
    pool: String,
    status: i64,
    reference: String,
}

impl RawEntry {
    fn into_entry(self) -> Result<PoolEntry, StoreError> {
        Ok(PoolEntry {
            address: parse_addr(&self.address)?,
            pool: self.pool,
            status: AddressStatus::from_code(self.status),
            reference: self.reference,
        })
    }
}

fn raw_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        address: row.get(0)?,
        pool: row.get(1)?,
        status: row.get(2)?,
        reference: row.get(3)?,
    })
}

fn entry_in(conn: &Connection, pool: &str, address: Ipv4Addr) -> Result<Option<PoolEntry>, StoreError> {
    conn.query_row(
        "SELECT ipaddress, ipam_label, status, reference FROM ipaddress_range
         WHERE ipam_label = ?1 AND ipaddress = ?2",
        params![pool, address.to_string()],
        raw_entry,
    )
    .optional()?
    .map(RawEntry::into_entry)
    .transpose()
}

fn lookup_in(conn: &Connection, pool: &str, reference: &str) -> Result<Option<Ipv4Addr>, StoreError> {
    let found: Option<String> = conn
        .query_row(
            "SELECT ipaddress FROM ipaddress_range
             WHERE ipam_label = ?1 AND reference = ?2 AND status = ?3",
            params![pool, reference, AddressStatus::Allocated.code()],
            |row| row.get(0),
        )
        .optional()?;
    found.as_deref().map(parse_addr).transpose()
}

fn cascade_delete(tx: &Transaction<'_>, pool: &str) -> Result<(), StoreError> {
    tx.execute("DELETE FROM a_records WHERE ipam_label = ?1", params![pool])?;
    tx.execute("DELETE FROM ipaddress_range WHERE ipam_label = ?1", params![pool])?;
    tx.execute("DELETE FROM label_map WHERE ipam_label = ?1", params![pool])?;
    debug!("Removed pool {} and all of its addresses", pool);
    Ok(())
}

fn parse_addr(raw: &str) -> Result<Ipv4Addr, StoreError> {
    Ipv4Addr::from_str(raw).map_err(|_| StoreError::Range(RangeError::InvalidAddress(raw.to_string())))
}

/// Opaque token for a row nobody owns
fn fresh_reference() -> String {
    uuid::Uuid::new_v4().to_string()
}
