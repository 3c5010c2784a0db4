//! Generated HTML pages.

use std::io;
use std::path::Path;

use crate::http::response::StatusCode;

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn document(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body>\n{body}<hr><address>webserv</address>\n</body>\n</html>\n"
    )
}

pub fn error(status: StatusCode) -> String {
    let title = escape(&status.to_string());
    document(&title, &format!("<h1>{title}</h1>\n"))
}

pub fn redirect(status: StatusCode, target: Option<&str>) -> String {
    let title = escape(&status.to_string());
    let body = match target {
        Some(target) => {
            let target = escape(target);
            format!("<h1>{title}</h1>\n<p>Moved to <a href=\"{target}\">{target}</a>.</p>\n")
        }
        None => format!("<h1>{title}</h1>\n"),
    };
    document(&title, &body)
}

pub fn created(url_path: &str) -> String {
    let path = escape(url_path);
    document(
        "201 Created",
        &format!("<h1>201 Created</h1>\n<p><a href=\"{path}\">{path}</a> was stored.</p>\n"),
    )
}

pub fn deleted(url_path: &str) -> String {
    let path = escape(url_path);
    document(
        "200 OK",
        &format!("<h1>200 OK</h1>\n<p>{path} was deleted.</p>\n"),
    )
}

/// Lists `dir`, directories first, each group sorted by name. Links are
/// built under `url_path`.
pub async fn autoindex(dir: &Path, url_path: &str) -> io::Result<String> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await?.is_dir() {
            dirs.push(name);
        } else {
            files.push(name);
        }
    }
    dirs.sort();
    files.sort();

    let base = if url_path.ends_with('/') {
        url_path.to_string()
    } else {
        format!("{url_path}/")
    };
    let title = format!("Index of {}", escape(&base));

    let mut body = format!("<h1>{title}</h1>\n<ul>\n");
    if base != "/" {
        body.push_str(&format!("<li><a href=\"{}../\">../</a></li>\n", escape(&base)));
    }
    for name in dirs.iter().map(|d| format!("{d}/")).chain(files) {
        let name = escape(&name);
        body.push_str(&format!(
            "<li><a href=\"{}{name}\">{name}</a></li>\n",
            escape(&base)
        ));
    }
    body.push_str("</ul>\n");

    Ok(document(&title, &body))
}
