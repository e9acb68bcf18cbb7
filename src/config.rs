//! Instance Configuration & Environment
//!
//! Startup arguments and the per-instance environment the dispatcher and the
//! replication layer read: data directory, snapshot filename, listen port,
//! role, and the replication identifiers reported by `INFO` and `PSYNC`.

use std::path::{Path, PathBuf};

/// Replication id a master instance advertises.
///
/// The reference format is 40 hex characters; this server does not rotate it.
const REPLICATION_ID: &str = "4fe9c61a33bbcd5a71e4bfbb871d0d9a8e210fc3";

/// Parsed command-line settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory holding the snapshot file.
    pub dir: String,
    /// Snapshot filename inside `dir`.
    pub dbfilename: String,
    /// TCP listen port.
    pub port: u16,
    /// Master to bootstrap from; absence means this instance *is* a master.
    pub replica_of: Option<(String, u16)>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            dir: ".".to_string(),
            dbfilename: "dump.rdb".to_string(),
            port: crate::DEFAULT_PORT,
            replica_of: None,
        }
    }
}

impl ServerConfig {
    /// Parses `--dir`, `--dbfilename`, `--port` and `--replicaof` out of an
    /// argument list (without the program name).
    pub fn parse_args(args: &[String]) -> Result<Self, String> {
        let mut config = ServerConfig::default();

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--dir" => {
                    config.dir = take_value(args, i, "--dir")?.to_string();
                    i += 2;
                }
                "--dbfilename" => {
                    config.dbfilename = take_value(args, i, "--dbfilename")?.to_string();
                    i += 2;
                }
                "--port" => {
                    let raw = take_value(args, i, "--port")?;
                    config.port = raw
                        .parse()
                        .map_err(|_| format!("invalid port number: {raw}"))?;
                    i += 2;
                }
                "--replicaof" => {
                    let raw = take_value(args, i, "--replicaof")?;
                    let parts: Vec<&str> = raw.split_whitespace().collect();
                    let [host, port] = parts.as_slice() else {
                        return Err(format!(
                            "--replicaof expects \"<host> <port>\", got {raw:?}"
                        ));
                    };
                    let port = port
                        .parse()
                        .map_err(|_| format!("invalid master port: {port}"))?;
                    config.replica_of = Some((host.to_string(), port));
                    i += 2;
                }
                other => return Err(format!("unknown argument: {other}")),
            }
        }

        Ok(config)
    }

    /// Full path of the snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        Path::new(&self.dir).join(&self.dbfilename)
    }
}

/// Instance role, reported by `INFO replication`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Slave => "slave",
        }
    }
}

/// The process-wide environment: configuration plus replication identity.
///
/// Built once at startup; `role` derives from the presence of `--replicaof`.
#[derive(Debug, Clone)]
pub struct Environment {
    pub dir: String,
    pub dbfilename: String,
    pub port: u16,
    pub role: Role,
    /// Id this instance hands out in `FULLRESYNC` replies.
    pub replid: String,
    /// Id reported as `master_replid` by `INFO`.
    pub master_replid: String,
    pub master_repl_offset: u64,
    pub replica_of: Option<(String, u16)>,
}

impl Environment {
    pub fn new(config: &ServerConfig) -> Self {
        let role = if config.replica_of.is_some() {
            Role::Slave
        } else {
            Role::Master
        };
        Self {
            dir: config.dir.clone(),
            dbfilename: config.dbfilename.clone(),
            port: config.port,
            role,
            replid: REPLICATION_ID.to_string(),
            master_replid: REPLICATION_ID.to_string(),
            master_repl_offset: 0,
            replica_of: config.replica_of.clone(),
        }
    }

    /// Looks up a `CONFIG GET` name. Only `dir` and `dbfilename` exist.
    pub fn config_get(&self, name: &str) -> Option<&str> {
        match name {
            "dir" => Some(&self.dir),
            "dbfilename" => Some(&self.dbfilename),
            _ => None,
        }
    }

    /// The replication section served by `INFO`.
    pub fn replication_info(&self) -> String {
        format!(
            "role:{}\nmaster_replid:{}\nmaster_repl_offset:{}",
            self.role.as_str(),
            self.master_replid,
            self.master_repl_offset
        )
    }
}

fn take_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str, String> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} requires a value"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ServerConfig, String> {
        let owned: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        ServerConfig::parse_args(&owned)
    }

    #[test]
    fn defaults_cover_every_field() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.dir, ".");
        assert_eq!(config.dbfilename, "dump.rdb");
        assert_eq!(config.port, 6379);
        assert!(config.replica_of.is_none());
    }

    #[test]
    fn parses_dir_dbfilename_and_port() {
        let config = parse(&[
            "--dir",
            "/var/lib/blazekv",
            "--dbfilename",
            "store.rdb",
            "--port",
            "7000",
        ])
        .unwrap();
        assert_eq!(config.dir, "/var/lib/blazekv");
        assert_eq!(config.dbfilename, "store.rdb");
        assert_eq!(config.port, 7000);
        assert_eq!(
            config.snapshot_path(),
            PathBuf::from("/var/lib/blazekv/store.rdb")
        );
    }

    #[test]
    fn replicaof_takes_a_quoted_host_port_pair() {
        let config = parse(&["--replicaof", "localhost 6379"]).unwrap();
        assert_eq!(
            config.replica_of,
            Some(("localhost".to_string(), 6379))
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&["--port", "high"]).is_err());
        assert!(parse(&["--port"]).is_err());
        assert!(parse(&["--replicaof", "localhost"]).is_err());
        assert!(parse(&["--banner"]).is_err());
    }

    #[test]
    fn role_follows_replicaof_presence() {
        let master = Environment::new(&parse(&[]).unwrap());
        assert_eq!(master.role, Role::Master);

        let replica = Environment::new(&parse(&["--replicaof", "localhost 6379"]).unwrap());
        assert_eq!(replica.role, Role::Slave);
    }

    #[test]
    fn replication_info_uses_newline_separators() {
        let env = Environment::new(&ServerConfig::default());
        let info = env.replication_info();
        let lines: Vec<&str> = info.split('\n').collect();
        assert_eq!(lines[0], "role:master");
        assert!(lines[1].starts_with("master_replid:"));
        assert_eq!(lines[2], "master_repl_offset:0");
    }

    #[test]
    fn config_get_knows_exactly_two_names() {
        let env = Environment::new(&ServerConfig::default());
        assert_eq!(env.config_get("dir"), Some("."));
        assert_eq!(env.config_get("dbfilename"), Some("dump.rdb"));
        assert_eq!(env.config_get("maxmemory"), None);
    }
}
