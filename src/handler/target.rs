use std::path::{Component, Path, PathBuf};

use url::Url;

/// A request target resolved into a decoded, dot-free path and its query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    path: String,
    query: Option<String>,
}

impl Target {
    /// Resolves a raw origin-form target such as `/a/./b/../c%20d?x=1`.
    ///
    /// Returns `None` when the target is not origin-form, would still
    /// climb above the root after dot segments are removed (for example
    /// through an encoded `..%2F`), or decodes to bytes that are not UTF-8.
    ///
    /// ```
    /// # use webserv::handler::target::Target;
    /// let t = Target::parse("/docs/../img/a%20b.png?size=2").unwrap();
    /// assert_eq!(t.path(), "/img/a b.png");
    /// assert_eq!(t.query(), Some("size=2"));
    /// assert!(Target::parse("/..%2F..%2Fetc/passwd").is_none());
    /// assert!(Target::parse("/private/%FFx.txt").is_none());
    /// ```
    pub fn parse(raw: &str) -> Option<Self> {
        if !raw.starts_with('/') {
            return None;
        }
        let base = Url::parse("file:///").ok()?;
        let url = base.join(raw).ok()?;
        if url.scheme() != "file" || url.host_str().is_some_and(|h| !h.is_empty()) {
            return None;
        }

        let path = url.to_file_path().ok()?;
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return None;
        }

        // Routing matches on the decoded text, so it has to be exact.
        let path = path.into_os_string().into_string().ok()?;

        Some(Self {
            path,
            query: url.query().map(str::to_string),
        })
    }

    /// Decoded absolute path, used for location routing.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Location of the resource under `root`.
    pub fn under(&self, root: &Path) -> PathBuf {
        let relative = self.path.trim_start_matches('/');
        if relative.is_empty() {
            root.to_path_buf()
        } else {
            root.join(relative)
        }
    }
}
