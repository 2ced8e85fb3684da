use rusqlite::{params, Connection, OptionalExtension};

// ── App Config ─────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn delete_config(conn: &Connection, key: &str) -> Result<bool, rusqlite::Error> {
    let n = conn.execute("DELETE FROM app_config WHERE key = ?1", params![key])?;
    Ok(n > 0)
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Response Cache ─────────────────────────────────────────────────

pub fn get_cache_value(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM response_cache WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn put_cache_value(
    conn: &Connection,
    key: &str,
    value: &str,
    cached_at_ms: i64,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO response_cache (key, value, cached_at_ms)
         VALUES (?1, ?2, ?3)",
        params![key, value, cached_at_ms],
    )?;
    Ok(())
}

pub fn delete_cache_value(conn: &Connection, key: &str) -> Result<bool, rusqlite::Error> {
    let n = conn.execute("DELETE FROM response_cache WHERE key = ?1", params![key])?;
    Ok(n > 0)
}

/// Delete every entry whose key starts with `prefix`. Returns the number removed.
pub fn clear_cache(conn: &Connection, prefix: &str) -> Result<usize, rusqlite::Error> {
    // substr comparison instead of LIKE: `_` in the prefix is a LIKE wildcard.
    conn.execute(
        "DELETE FROM response_cache WHERE substr(key, 1, length(?1)) = ?1",
        params![prefix],
    )
}

/// Delete entries under `prefix` cached before `cutoff_ms`.
pub fn prune_cache(
    conn: &Connection,
    prefix: &str,
    cutoff_ms: i64,
) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM response_cache
         WHERE substr(key, 1, length(?1)) = ?1 AND cached_at_ms < ?2",
        params![prefix, cutoff_ms],
    )
}

pub fn count_cache_entries(conn: &Connection, prefix: &str) -> Result<u64, rusqlite::Error> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM response_cache WHERE substr(key, 1, length(?1)) = ?1",
        params![prefix],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}
