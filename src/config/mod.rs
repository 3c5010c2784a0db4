//! Server configuration.
//!
//! The configuration file uses an nginx-like syntax:
//!
//! ```text
//! backlog 500;
//!
//! server {
//!     listen 127.0.0.1:8080;
//!     server_name localhost;
//!     root www;
//!     index index.html;
//!     error_page 404 /404.html;
//!     cgi .php php-cgi;
//!
//!     location /uploads {
//!         limit_except GET POST DELETE;
//!         client_max_body_size 10;
//!     }
//! }
//! ```
//!
//! [`Config::parse`] turns the source into an immutable tree of
//! [`VirtualHost`]s which the server shares read-only between connections.

pub mod directive;
pub mod lexer;

use std::collections::{BTreeMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use lexer::{Token, TokenKind};

pub const DEFAULT_ADDRESS: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_BODY_LIMIT_MIB: u64 = 1;
pub const DEFAULT_BACKLOG: u32 = 500;
pub const DEFAULT_ROOT: &str = "server_root";

/// `limit_except` value that lifts every method restriction.
pub const ALL_METHODS: &str = "ALL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("invalid number of arguments in \"{0}\"")]
    InvalidNumberArgs(String),

    #[error("directive is duplicate \"{0}\"")]
    DirectiveDuplicate(String),

    #[error("directive invalid value in \"{0}\"")]
    DirectiveInvalidValue(String),

    #[error("unknown directive \"{0}\"")]
    DirectiveUnknown(String),

    #[error("invalid {field} in \"{value}\"")]
    InvalidField { field: String, value: String },

    #[error("no server block defined")]
    NoServers,
}

impl ConfigError {
    pub fn invalid_field(field: &str, value: &str) -> Self {
        ConfigError::InvalidField {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub status: u16,
    pub target: String,
}

/// Path-prefix scoped override of a virtual host's rules. Unset fields
/// inherit from the enclosing [`VirtualHost`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct Location {
    pub prefix: String,
    pub root: Option<PathBuf>,
    pub index: Option<Vec<String>>,
    pub limit_except: Vec<String>,
    pub client_max_body_size: Option<u64>,
    pub autoindex: Option<bool>,
    pub cgi: BTreeMap<String, String>,
    pub redirect: Option<Redirect>,
}

impl Location {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Segment-aware prefix test: `/img` matches `/img` and `/img/a.png`
    /// but not `/imgs`.
    pub fn matches(&self, path: &str) -> bool {
        if !path.starts_with(&self.prefix) {
            return false;
        }
        self.prefix.ends_with('/')
            || path.len() == self.prefix.len()
            || path.as_bytes()[self.prefix.len()] == b'/'
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VirtualHost {
    pub address: Ipv4Addr,
    pub port: u16,
    pub server_names: Vec<String>,
    pub root: PathBuf,
    pub index: Vec<String>,
    pub error_pages: BTreeMap<u16, String>,
    pub timeout_secs: u64,
    pub client_max_body_size: u64,
    pub access_log: Option<PathBuf>,
    pub error_log: Option<PathBuf>,
    pub autoindex: bool,
    pub cgi: BTreeMap<String, String>,
    pub redirect: Option<Redirect>,
    pub locations: Vec<Location>,
}

impl Default for VirtualHost {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            port: DEFAULT_PORT,
            server_names: vec!["localhost".to_string()],
            root: PathBuf::from(DEFAULT_ROOT),
            index: vec!["index.html".to_string(), "index.htm".to_string()],
            error_pages: BTreeMap::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            client_max_body_size: DEFAULT_BODY_LIMIT_MIB,
            access_log: None,
            error_log: None,
            autoindex: false,
            cgi: BTreeMap::new(),
            redirect: None,
            locations: Vec::new(),
        }
    }
}

impl VirtualHost {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.address, self.port))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Compares against `server_name`s, ignoring case and any `:port`
    /// suffix of the `Host` header.
    pub fn answers_to(&self, host: &str) -> bool {
        let name = host.split(':').next().unwrap_or(host);
        self.server_names
            .iter()
            .any(|n| n.eq_ignore_ascii_case(name))
    }

    /// Largest body any route of this host may accept, in bytes. The
    /// request parser stops capturing bodies above this size.
    pub fn largest_body_limit(&self) -> u64 {
        self.locations
            .iter()
            .filter_map(|l| l.client_max_body_size)
            .chain(std::iter::once(self.client_max_body_size))
            .max()
            .unwrap_or(DEFAULT_BODY_LIMIT_MIB)
            * 1024
            * 1024
    }

    /// Longest matching location wins.
    pub fn route(&self, path: &str) -> Route<'_> {
        let location = self
            .locations
            .iter()
            .filter(|l| l.matches(path))
            .max_by_key(|l| l.prefix.len());
        Route {
            host: self,
            location,
        }
    }

    pub fn error_page(&self, status: u16) -> Option<PathBuf> {
        self.error_pages.get(&status).map(|p| self.root.join(p))
    }
}

/// The rules that apply to one request path: a host merged with the
/// location that matched, if any.
#[derive(Debug, Clone, Copy)]
pub struct Route<'a> {
    pub host: &'a VirtualHost,
    pub location: Option<&'a Location>,
}

impl<'a> Route<'a> {
    pub fn root(&self) -> &'a Path {
        self.location
            .and_then(|l| l.root.as_deref())
            .unwrap_or(self.host.root.as_path())
    }

    pub fn index(&self) -> &'a [String] {
        self.location
            .and_then(|l| l.index.as_deref())
            .unwrap_or(self.host.index.as_slice())
    }

    pub fn autoindex(&self) -> bool {
        self.location
            .and_then(|l| l.autoindex)
            .unwrap_or(self.host.autoindex)
    }

    pub fn body_limit(&self) -> u64 {
        self.location
            .and_then(|l| l.client_max_body_size)
            .unwrap_or(self.host.client_max_body_size)
            * 1024
            * 1024
    }

    pub fn redirect(&self) -> Option<&'a Redirect> {
        self.location
            .and_then(|l| l.redirect.as_ref())
            .or(self.host.redirect.as_ref())
    }

    /// Location mappings shadow the host's.
    pub fn cgi_interpreter(&self, ext: &str) -> Option<&'a str> {
        self.location
            .and_then(|l| l.cgi.get(ext))
            .or_else(|| self.host.cgi.get(ext))
            .map(String::as_str)
    }

    /// An empty list, or one holding [`ALL_METHODS`], allows everything.
    pub fn allows(&self, method: &str) -> bool {
        let Some(limits) = self.location.map(|l| &l.limit_except) else {
            return true;
        };
        limits.is_empty()
            || limits[0] == ALL_METHODS
            || limits.iter().any(|m| m == method)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub backlog: u32,
    pub servers: Vec<VirtualHost>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&src)
    }

    pub fn parse(src: &str) -> Result<Self, ConfigError> {
        let tokens = lexer::tokenize(src)?;
        let mut cursor = Cursor {
            tokens: tokens.into_iter().peekable(),
            last_line: 1,
        };

        let mut config = Config {
            backlog: DEFAULT_BACKLOG,
            servers: Vec::new(),
        };
        let mut seen = HashSet::new();

        while let Some(name) = cursor.next_directive()? {
            if name == "server" {
                cursor.expect_open()?;
                config.servers.push(parse_server(&mut cursor)?);
                continue;
            }
            let stmt = cursor.statement(name)?;
            check_once(&mut seen, &stmt)?;
            match stmt[0].as_str() {
                "backlog" => config.backlog = directive::backlog(&stmt)?,
                other => return Err(ConfigError::DirectiveUnknown(other.to_string())),
            }
        }

        if config.servers.is_empty() {
            return Err(ConfigError::NoServers);
        }
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

fn check_once(seen: &mut HashSet<String>, stmt: &[String]) -> Result<(), ConfigError> {
    if !seen.insert(stmt[0].clone()) {
        return Err(ConfigError::DirectiveDuplicate(stmt[0].clone()));
    }
    Ok(())
}

fn parse_server(cursor: &mut Cursor) -> Result<VirtualHost, ConfigError> {
    let mut host = VirtualHost::default();
    let mut seen = HashSet::new();

    loop {
        let Some(name) = cursor.next_in_block()? else {
            return Ok(host);
        };
        if name == "location" {
            let prefix = cursor.word("location")?;
            cursor.expect_open()?;
            host.locations.push(parse_location(cursor, prefix)?);
            continue;
        }

        let stmt = cursor.statement(name)?;
        if !matches!(stmt[0].as_str(), "error_page" | "cgi") {
            check_once(&mut seen, &stmt)?;
        }
        match stmt[0].as_str() {
            "listen" => (host.address, host.port) = directive::listen(&stmt)?,
            "server_name" => host.server_names = directive::server_name(&stmt)?,
            "root" => host.root = directive::root(&stmt)?,
            "index" => host.index = directive::index(&stmt)?,
            "error_page" => {
                let (code, page) = directive::error_page(&stmt)?;
                host.error_pages.insert(code, page);
            }
            "timeout" => host.timeout_secs = directive::timeout(&stmt)?,
            "client_max_body_size" => {
                host.client_max_body_size = directive::client_max_body_size(&stmt)?
            }
            "access_log" => host.access_log = Some(directive::log_path(&stmt)?),
            "error_log" => host.error_log = Some(directive::log_path(&stmt)?),
            "autoindex" => host.autoindex = directive::autoindex(&stmt)?,
            "cgi" => {
                let (ext, interpreter) = directive::cgi(&stmt)?;
                host.cgi.insert(ext, interpreter);
            }
            "return" => host.redirect = Some(directive::redirect(&stmt)?),
            other => return Err(ConfigError::DirectiveUnknown(other.to_string())),
        }
    }
}

fn parse_location(cursor: &mut Cursor, prefix: String) -> Result<Location, ConfigError> {
    let mut location = Location::new(prefix);
    let mut seen = HashSet::new();

    while let Some(name) = cursor.next_in_block()? {
        let stmt = cursor.statement(name)?;
        if stmt[0] != "cgi" {
            check_once(&mut seen, &stmt)?;
        }
        match stmt[0].as_str() {
            "root" => location.root = Some(directive::root(&stmt)?),
            "index" => location.index = Some(directive::index(&stmt)?),
            "limit_except" => location.limit_except = directive::limit_except(&stmt)?,
            "client_max_body_size" => {
                location.client_max_body_size = Some(directive::client_max_body_size(&stmt)?)
            }
            "autoindex" => location.autoindex = Some(directive::autoindex(&stmt)?),
            "cgi" => {
                let (ext, interpreter) = directive::cgi(&stmt)?;
                location.cgi.insert(ext, interpreter);
            }
            "return" => location.redirect = Some(directive::redirect(&stmt)?),
            other => return Err(ConfigError::DirectiveUnknown(other.to_string())),
        }
    }
    Ok(location)
}

struct Cursor {
    tokens: std::iter::Peekable<std::vec::IntoIter<Token>>,
    last_line: usize,
}

impl Cursor {
    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.next()?;
        self.last_line = token.line;
        Some(token)
    }

    fn syntax(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::Syntax {
            line: self.last_line,
            message: message.into(),
        }
    }

    /// Top level: a directive name or end of input.
    fn next_directive(&mut self) -> Result<Option<String>, ConfigError> {
        match self.bump() {
            None => Ok(None),
            Some(Token { kind: TokenKind::Word(w), .. }) => Ok(Some(w)),
            Some(_) => Err(self.syntax("expected a directive")),
        }
    }

    /// Inside a block: a directive name, or `None` once the closing brace
    /// has been consumed.
    fn next_in_block(&mut self) -> Result<Option<String>, ConfigError> {
        match self.bump() {
            None => Err(self.syntax("unexpected end of file, expected '}'")),
            Some(Token { kind: TokenKind::BlockClose, .. }) => Ok(None),
            Some(Token { kind: TokenKind::Word(w), .. }) => Ok(Some(w)),
            Some(_) => Err(self.syntax("expected a directive")),
        }
    }

    fn word(&mut self, directive: &str) -> Result<String, ConfigError> {
        match self.bump() {
            Some(Token { kind: TokenKind::Word(w), .. }) => Ok(w),
            _ => Err(ConfigError::InvalidNumberArgs(directive.to_string())),
        }
    }

    fn expect_open(&mut self) -> Result<(), ConfigError> {
        match self.bump() {
            Some(Token { kind: TokenKind::BlockOpen, .. }) => Ok(()),
            _ => Err(self.syntax("expected '{'")),
        }
    }

    /// Collects `name arg...;` into one token list, name first.
    fn statement(&mut self, name: String) -> Result<Vec<String>, ConfigError> {
        let mut stmt = vec![name];
        loop {
            match self.bump() {
                Some(Token { kind: TokenKind::Word(w), .. }) => stmt.push(w),
                Some(Token { kind: TokenKind::Semicolon, .. }) => return Ok(stmt),
                _ => return Err(self.syntax(format!("expected ';' after \"{}\"", stmt[0]))),
            }
        }
    }
}
