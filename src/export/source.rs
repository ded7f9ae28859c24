//! Row sources for export operations
//!
//! A row source is a forward-only cursor over a query result. Column names
//! are known as soon as the source is opened; rows are then pulled one at a
//! time until the cursor is exhausted or fails.

use std::error::Error;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::pin::Pin;

use async_trait::async_trait;
use deadpool_postgres::Object;
use futures::TryStreamExt;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio_postgres::types::{FromSql, Kind, Type};
use tokio_postgres::{Column, RowStream};
use tracing::{debug, info};

use crate::error::{Result, SheetError};

use super::value::{ColumnSet, Row, Value};

/// Trait for pulling rows from a query result
#[async_trait]
pub trait RowSource: Send {
    /// Column names of the result set, in order
    fn columns(&self) -> &ColumnSet;

    /// Fetch the next row
    ///
    /// # Returns
    /// * `Result<Option<Row>>` - Next row, or None once the cursor is exhausted
    async fn next_row(&mut self) -> Result<Option<Row>>;

    /// Release the cursor and its connection
    async fn close(&mut self) -> Result<()>;
}

/// Streaming cursor over a PostgreSQL query
///
/// The statement is prepared first so that column names and types are known
/// before any row is read; rows are then streamed with `query_raw`, which
/// reads from the socket on demand instead of buffering the whole result.
pub struct PgRowSource {
    columns: ColumnSet,
    types: Vec<Type>,
    stream: Option<Pin<Box<RowStream>>>,
    client: Option<Object>,
    fetched: u64,
}

impl PgRowSource {
    /// Prepare and start the query on a pooled connection
    ///
    /// # Arguments
    /// * `client` - Pooled connection; held until the source is closed
    /// * `sql` - Query text
    pub async fn open(client: Object, sql: &str) -> Result<Self> {
        let statement = client
            .prepare(sql)
            .await
            .map_err(|e| SheetError::Query(e.to_string()))?;

        let columns = statement.columns();
        if columns.is_empty() {
            return Err(SheetError::Metadata(
                "query does not return any columns".to_string(),
            ));
        }
        let names: ColumnSet = columns.iter().map(Column::name).collect();
        let types = columns.iter().map(|c| c.type_().clone()).collect();
        debug!("Query returns {} columns: {:?}", names.len(), names.names());

        let stream = client
            .query_raw(&statement, Vec::<String>::new())
            .await
            .map_err(|e| SheetError::Query(e.to_string()))?;

        info!("Query started, streaming rows");

        Ok(Self {
            columns: names,
            types,
            stream: Some(Box::pin(stream)),
            client: Some(client),
            fetched: 0,
        })
    }

    fn release(&mut self) {
        self.stream = None;
        self.client = None;
    }
}

#[async_trait]
impl RowSource for PgRowSource {
    fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        let stream = match self.stream.as_mut() {
            Some(s) => s,
            None => return Ok(None),
        };

        match stream.try_next().await {
            Ok(Some(pg_row)) => {
                let row = decode_row(&pg_row, &self.columns, &self.types)?;
                self.fetched += 1;
                Ok(Some(row))
            }
            Ok(None) => {
                debug!("Cursor exhausted after {} rows", self.fetched);
                self.release();
                Ok(None)
            }
            Err(e) => {
                // On error, drop the cursor to release the connection
                self.release();
                Err(SheetError::Scan(e.to_string()))
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.client.is_some() {
            self.release();
            info!("Closed cursor after fetching {} rows", self.fetched);
        }
        Ok(())
    }
}

/// Decode every column of a PostgreSQL row
fn decode_row(pg_row: &tokio_postgres::Row, columns: &ColumnSet, types: &[Type]) -> Result<Row> {
    types
        .iter()
        .enumerate()
        .map(|(idx, ty)| {
            decode_value(pg_row, idx, ty).map_err(|e| {
                SheetError::Scan(format!(
                    "column '{}' ({}): {e}",
                    columns.names()[idx],
                    ty.name()
                ))
            })
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(Row::new)
}

/// Decode one column by its PostgreSQL type
///
/// Types without a dedicated mapping are read as text; anything that cannot
/// be read that way is reported as an error rather than silently dropped.
fn decode_value(
    row: &tokio_postgres::Row,
    idx: usize,
    ty: &Type,
) -> std::result::Result<Value, tokio_postgres::Error> {
    let value: Value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.into(),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(i64::from).into(),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(i64::from).into(),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.into(),
        Type::OID => row.try_get::<_, Option<u32>>(idx)?.map(i64::from).into(),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map(f64::from).into(),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.into(),
        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(idx)?
            .map(|d| d.to_f64().map_or_else(|| Value::String(d.to_string()), Value::Float))
            .unwrap_or(Value::Null),
        Type::TIMESTAMP => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
            .map_or(Value::Null, Value::Timestamp),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
            .map_or(Value::Null, |dt| Value::Timestamp(dt.naive_utc())),
        Type::DATE => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)?
            .map_or(Value::Null, Value::Date),
        Type::TIME => row
            .try_get::<_, Option<chrono::NaiveTime>>(idx)?
            .map(|t| t.format("%H:%M:%S%.f").to_string())
            .into(),
        Type::UUID => row
            .try_get::<_, Option<uuid::Uuid>>(idx)?
            .map(|u| u.to_string())
            .into(),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(|j| j.to_string())
            .into(),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(idx)?
            .map(|b| format!("\\x{}", hex::encode(b)))
            .into(),
        _ => row
            .try_get::<_, Option<OpaqueText>>(idx)?
            .map(|t| t.0)
            .into(),
    };
    Ok(value)
}

/// Text rendering of a column type without a dedicated mapping
///
/// Accepts every type. Text-encoded types (enums, `"char"`, `name`, citext
/// and the like) are read as UTF-8; `interval`, `money`, `inet`/`cidr` and
/// `timetz` are decoded from their binary form; anything else is rendered
/// as `\x` followed by the raw bytes in hex.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OpaqueText(String);

impl<'a> FromSql<'a> for OpaqueText {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(OpaqueText(render_opaque(ty, raw)))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

fn render_opaque(ty: &Type, raw: &[u8]) -> String {
    if let Kind::Domain(base) = ty.kind() {
        return render_opaque(base, raw);
    }

    let decoded = if is_text_encoded(ty) {
        std::str::from_utf8(raw).ok().map(str::to_string)
    } else {
        match *ty {
            Type::INTERVAL => render_interval(raw),
            Type::MONEY => be_i64(raw, 0).map(render_money),
            Type::INET | Type::CIDR => render_inet(raw),
            Type::TIMETZ => render_timetz(raw),
            _ => None,
        }
    };

    decoded.unwrap_or_else(|| format!("\\x{}", hex::encode(raw)))
}

fn is_text_encoded(ty: &Type) -> bool {
    matches!(ty.kind(), Kind::Enum(_))
        || matches!(*ty, Type::CHAR | Type::XML)
        || <String as FromSql>::accepts(ty)
}

fn be_i64(raw: &[u8], at: usize) -> Option<i64> {
    let bytes: [u8; 8] = raw.get(at..at + 8)?.try_into().ok()?;
    Some(i64::from_be_bytes(bytes))
}

fn be_i32(raw: &[u8], at: usize) -> Option<i32> {
    let bytes: [u8; 4] = raw.get(at..at + 4)?.try_into().ok()?;
    Some(i32::from_be_bytes(bytes))
}

/// `1 year 2 mons 3 days 04:05:06.5`, like PostgreSQL's default output
fn render_interval(raw: &[u8]) -> Option<String> {
    let micros = be_i64(raw, 0)?;
    let days = be_i32(raw, 8)?;
    let months = be_i32(raw, 12)?;

    fn unit(n: i32, name: &str) -> String {
        if n.abs() == 1 {
            format!("{n} {name}")
        } else {
            format!("{n} {name}s")
        }
    }

    let mut parts = Vec::new();
    let (years, months) = (months / 12, months % 12);
    if years != 0 {
        parts.push(unit(years, "year"));
    }
    if months != 0 {
        parts.push(unit(months, "mon"));
    }
    if days != 0 {
        parts.push(unit(days, "day"));
    }
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        parts.push(format!("{sign}{}", clock(micros.unsigned_abs())));
    }
    Some(parts.join(" "))
}

/// `HH:MM:SS[.ffffff]` with trailing zeros of the fraction dropped
fn clock(micros: u64) -> String {
    let secs = micros / 1_000_000;
    let frac = micros % 1_000_000;
    let mut out = format!("{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60);
    if frac != 0 {
        let digits = format!("{frac:06}");
        out.push('.');
        out.push_str(digits.trim_end_matches('0'));
    }
    out
}

fn render_money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Binary inet/cidr: family, prefix bits, is-cidr flag, address length, address
fn render_inet(raw: &[u8]) -> Option<String> {
    let (&family, &bits, &is_cidr, &len) = (raw.first()?, raw.get(1)?, raw.get(2)?, raw.get(3)?);
    let addr = raw.get(4..4 + usize::from(len))?;

    let (text, full) = match family {
        2 => {
            let octets: [u8; 4] = addr.try_into().ok()?;
            (Ipv4Addr::from(octets).to_string(), 32)
        }
        3 => {
            let octets: [u8; 16] = addr.try_into().ok()?;
            (Ipv6Addr::from(octets).to_string(), 128)
        }
        _ => return None,
    };

    if is_cidr != 0 || bits != full {
        Some(format!("{text}/{bits}"))
    } else {
        Some(text)
    }
}

/// Binary timetz: microseconds since midnight, then the zone in seconds west of UTC
fn render_timetz(raw: &[u8]) -> Option<String> {
    let micros = u64::try_from(be_i64(raw, 0)?).ok()?;
    let east = -i64::from(be_i32(raw, 8)?);

    let sign = if east < 0 { '-' } else { '+' };
    let east = east.unsigned_abs();
    let (hours, minutes) = (east / 3600, east / 60 % 60);

    let mut out = format!("{}{sign}{hours:02}", clock(micros));
    if minutes != 0 {
        out.push_str(&format!(":{minutes:02}"));
    }
    Some(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// In-memory source yielding scripted rows, optionally failing after them
    pub struct MockRowSource {
        columns: ColumnSet,
        rows: VecDeque<Row>,
        fail_after: bool,
        pub closed: Arc<AtomicBool>,
    }

    impl MockRowSource {
        pub fn new(columns: &[&str], rows: Vec<Row>) -> Self {
            Self {
                columns: columns.iter().copied().collect(),
                rows: rows.into(),
                fail_after: false,
                closed: Arc::new(AtomicBool::new(false)),
            }
        }

        /// `count` rows of `[i, "row-i"]`
        pub fn numbered(count: usize) -> Self {
            let rows = (0..count)
                .map(|i| Row::new(vec![Value::Integer(i as i64), Value::String(format!("row-{i}"))]))
                .collect();
            Self::new(&["id", "label"], rows)
        }

        /// Yield the scripted rows, then fail with a scan error
        pub fn failing_after(mut self) -> Self {
            self.fail_after = true;
            self
        }
    }

    #[async_trait]
    impl RowSource for MockRowSource {
        fn columns(&self) -> &ColumnSet {
            &self.columns
        }

        async fn next_row(&mut self) -> Result<Option<Row>> {
            match self.rows.pop_front() {
                Some(row) => Ok(Some(row)),
                None if self.fail_after => {
                    Err(SheetError::Scan("connection reset by peer".to_string()))
                }
                None => Ok(None),
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_mock_source_drains_then_ends() {
        let mut source = MockRowSource::numbered(2);
        assert_eq!(source.columns().len(), 2);
        assert!(source.next_row().await.unwrap().is_some());
        assert!(source.next_row().await.unwrap().is_some());
        assert!(source.next_row().await.unwrap().is_none());
    }

    #[test]
    fn test_row_source_trait_object() {
        fn _accepts_row_source(_source: Box<dyn RowSource>) {}
    }

    fn opaque(ty: &Type, raw: &[u8]) -> String {
        OpaqueText::from_sql(ty, raw).unwrap().0
    }

    fn interval(micros: i64, days: i32, months: i32) -> Vec<u8> {
        let mut raw = micros.to_be_bytes().to_vec();
        raw.extend_from_slice(&days.to_be_bytes());
        raw.extend_from_slice(&months.to_be_bytes());
        raw
    }

    #[test]
    fn test_opaque_accepts_every_type() {
        for ty in [Type::INTERVAL, Type::INET, Type::MONEY, Type::TIMETZ, Type::INT4_ARRAY] {
            assert!(<OpaqueText as FromSql>::accepts(&ty), "{ty}");
            assert!(<Option<OpaqueText> as FromSql>::accepts(&ty), "{ty}");
        }
    }

    #[test]
    fn test_opaque_interval() {
        assert_eq!(
            opaque(&Type::INTERVAL, &interval(3_723_500_000, 3, 14)),
            "1 year 2 mons 3 days 01:02:03.5"
        );
        assert_eq!(opaque(&Type::INTERVAL, &interval(0, 1, 0)), "1 day");
        assert_eq!(opaque(&Type::INTERVAL, &interval(-90_000_000, 0, 0)), "-00:01:30");
        assert_eq!(opaque(&Type::INTERVAL, &interval(0, 0, 0)), "00:00:00");
    }

    #[test]
    fn test_opaque_money() {
        assert_eq!(opaque(&Type::MONEY, &123_456i64.to_be_bytes()), "1234.56");
        assert_eq!(opaque(&Type::MONEY, &(-5i64).to_be_bytes()), "-0.05");
    }

    #[test]
    fn test_opaque_inet_and_cidr() {
        assert_eq!(opaque(&Type::INET, &[2, 32, 0, 4, 192, 168, 0, 1]), "192.168.0.1");
        assert_eq!(opaque(&Type::INET, &[2, 24, 0, 4, 192, 168, 0, 1]), "192.168.0.1/24");
        assert_eq!(opaque(&Type::CIDR, &[2, 8, 1, 4, 10, 0, 0, 0]), "10.0.0.0/8");

        let mut v6 = vec![3, 128, 0, 16];
        v6.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        assert_eq!(opaque(&Type::INET, &v6), "::1");
    }

    #[test]
    fn test_opaque_timetz() {
        let mut raw = 37_800_000_000i64.to_be_bytes().to_vec();
        raw.extend_from_slice(&(-7_200i32).to_be_bytes());
        assert_eq!(opaque(&Type::TIMETZ, &raw), "10:30:00+02");

        let mut raw = 0i64.to_be_bytes().to_vec();
        raw.extend_from_slice(&19_800i32.to_be_bytes());
        assert_eq!(opaque(&Type::TIMETZ, &raw), "00:00:00-05:30");
    }

    #[test]
    fn test_opaque_text_encoded_types() {
        let mood = Type::new(
            "mood".to_string(),
            90_001,
            Kind::Enum(vec!["happy".to_string(), "sad".to_string()]),
            "public".to_string(),
        );
        assert_eq!(opaque(&mood, b"happy"), "happy");
        assert_eq!(opaque(&Type::CHAR, b"r"), "r");
        assert_eq!(opaque(&Type::NAME, b"pg_class"), "pg_class");

        let email = Type::new(
            "email".to_string(),
            90_002,
            Kind::Domain(Type::TEXT),
            "public".to_string(),
        );
        assert_eq!(opaque(&email, b"a@b.c"), "a@b.c");
    }

    #[test]
    fn test_opaque_falls_back_to_hex() {
        assert_eq!(opaque(&Type::INT4_ARRAY, &[0, 1, 0xff]), "\\x0001ff");
        // Truncated binary payloads do not fail the row
        assert_eq!(opaque(&Type::INTERVAL, &[1, 2]), "\\x0102");
    }
}
