use crate::config::DatabaseConfig;
use crate::db::{ExecError, QueryExecutor, ResultSet};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use std::time::Instant;
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

/// Opens one connection per query; nothing is pooled or reused.
pub struct SqlServerExecutor {
    config: DatabaseConfig,
}

impl SqlServerExecutor {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    /// Connection settings assembled from host (`host` or `host,port`),
    /// database, user and password.
    pub fn tds_config(&self) -> Config {
        let mut config = Config::new();

        let server = self.config.host.trim();
        let server = server.strip_prefix("tcp:").unwrap_or(server);
        match server.split_once(',') {
            Some((host, port)) => {
                config.host(host.trim());
                if let Ok(port) = port.trim().parse::<u16>() {
                    config.port(port);
                }
            }
            None => config.host(server),
        }

        config.database(&self.config.name);
        config.authentication(AuthMethod::sql_server(&self.config.user, &self.config.password));
        if self.config.trust_server_certificate {
            config.trust_cert();
        }
        config.application_name("nl-sql-explorer");
        config
    }
}

/// Points the connection at the host and port from a routing redirect.
pub fn follow_redirect(mut config: Config, host: &str, port: u16) -> Config {
    config.host(host);
    config.port(port);
    config
}

async fn open(config: Config) -> tiberius::Result<Client<Compat<TcpStream>>> {
    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;
    Client::connect(config, tcp.compat_write()).await
}

// Azure SQL's Redirect policy answers the first login with a routing token
async fn connect(config: Config) -> Result<Client<Compat<TcpStream>>, ExecError> {
    let addr = config.get_addr();
    match open(config.clone()).await {
        Ok(client) => Ok(client),
        Err(tiberius::error::Error::Routing { host, port }) => {
            info!("Redirected from {} to {}:{}", addr, host, port);
            open(follow_redirect(config, &host, port))
                .await
                .map_err(|e| ExecError::Connect(format!("{}:{}: {}", host, port, e)))
        }
        Err(e) => Err(ExecError::Connect(format!("{}: {}", addr, e))),
    }
}

/// Builds the result from the first result set. A statement that produced
/// no result set at all is an error, not an empty result.
pub fn materialize(
    columns: Option<Vec<String>>,
    rows: Vec<Vec<ColumnData<'static>>>,
) -> Result<ResultSet, ExecError> {
    let columns = columns
        .ok_or_else(|| ExecError::Query("statement returned no result set".to_string()))?;
    let rows = rows
        .iter()
        .map(|row| row.iter().map(column_value).collect())
        .collect();
    Ok(ResultSet::new(columns, rows))
}

#[async_trait]
impl QueryExecutor for SqlServerExecutor {
    async fn execute(&self, sql: &str) -> Result<ResultSet, ExecError> {
        let start_time = Instant::now();
        let config = self.tds_config();
        debug!("Connecting to SQL Server at {}", config.get_addr());

        let mut client = connect(config).await?;

        let mut stream = client
            .simple_query(sql)
            .await
            .map_err(|e| ExecError::Query(e.to_string()))?;

        let columns = stream
            .columns()
            .await
            .map_err(|e| ExecError::Query(e.to_string()))?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect::<Vec<_>>());

        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| ExecError::Query(e.to_string()))?
            .into_iter()
            .map(|row| row.into_iter().collect())
            .collect::<Vec<Vec<ColumnData<'static>>>>();

        let result = materialize(columns, rows)?;
        info!(
            "Query returned {} rows across {} columns in {}ms",
            result.row_count(),
            result.columns.len(),
            start_time.elapsed().as_millis()
        );

        Ok(result)
    }
}

/// Converts one SQL Server cell to JSON. NULL of any type becomes `null`.
pub fn column_value(data: &ColumnData<'static>) -> Value {
    match data {
        ColumnData::U8(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I16(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I32(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I64(v) => v.map(Value::from).unwrap_or(Value::Null),
        // Go through the shortest decimal text so 0.1f32 stays 0.1
        ColumnData::F32(v) => v
            .and_then(|f| f.to_string().parse::<f64>().ok())
            .map(Value::from)
            .unwrap_or(Value::Null),
        ColumnData::F64(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::Bit(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::String(v) => v.as_deref().map(Value::from).unwrap_or(Value::Null),
        ColumnData::Guid(v) => v
            .map(|g| Value::String(g.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Binary(v) => v
            .as_deref()
            .map(|bytes| Value::String(to_hex(bytes)))
            .unwrap_or(Value::Null),
        ColumnData::Numeric(v) => v
            .map(|n| Value::String(n.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|xml| Value::String(xml.clone().into_owned().into_string()))
            .unwrap_or(Value::Null),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            temporal::<NaiveDateTime>(data, |dt| dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }
        ColumnData::Date(_) => temporal::<NaiveDate>(data, |d| d.format("%Y-%m-%d").to_string()),
        ColumnData::Time(_) => temporal::<NaiveTime>(data, |t| t.format("%H:%M:%S%.f").to_string()),
        ColumnData::DateTimeOffset(_) => {
            temporal::<DateTime<FixedOffset>>(data, |dt| dt.to_rfc3339())
        }
        #[allow(unreachable_patterns)]
        _ => Value::Null,
    }
}

fn temporal<'a, T: FromSql<'a>>(data: &'a ColumnData<'static>, render: impl Fn(T) -> String) -> Value {
    match T::from_sql(data) {
        Ok(Some(value)) => Value::String(render(value)),
        _ => Value::Null,
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
