//! GET, POST and DELETE against the filesystem.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::config::Route;
use crate::handler::Outcome;
use crate::handler::pages;
use crate::http::request::Request;
use crate::http::response::StatusCode;

/// Maps a filesystem failure onto the status reported to the client.
pub fn status_for(err: &io::Error) -> StatusCode {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => StatusCode::NOT_FOUND,
        io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        io::ErrorKind::IsADirectory | io::ErrorKind::DirectoryNotEmpty => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn is_cgi(route: &Route<'_>, path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| route.cgi_interpreter(ext).is_some())
}

async fn readable_file(path: &Path) -> Result<PathBuf, StatusCode> {
    fs::File::open(path).await.map_err(|e| status_for(&e))?;
    Ok(path.to_path_buf())
}

pub async fn get(route: &Route<'_>, path: &Path) -> Result<Outcome, StatusCode> {
    let meta = fs::metadata(path).await.map_err(|e| status_for(&e))?;
    if !meta.is_dir() {
        return readable_file(path).await.map(Outcome::File);
    }

    for candidate in route.index() {
        let index = path.join(candidate);
        if fs::metadata(&index).await.is_ok_and(|m| m.is_file()) {
            return readable_file(&index).await.map(Outcome::File);
        }
    }

    if route.autoindex() {
        Ok(Outcome::Listing(path.to_path_buf()))
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}

pub async fn post(
    route: &Route<'_>,
    path: &Path,
    url_path: &str,
    request: &Request,
) -> Result<Outcome, StatusCode> {
    if is_cgi(route, path) {
        return readable_file(path).await.map(Outcome::File);
    }

    if fs::metadata(path).await.is_ok_and(|m| m.is_dir()) {
        return Err(StatusCode::CONFLICT);
    }
    fs::write(path, &request.body).await.map_err(|e| {
        tracing::debug!(path = %path.display(), error = %e, "Failed to store body");
        status_for(&e)
    })?;

    tracing::info!(path = %path.display(), bytes = request.body.len(), "Stored upload");
    Ok(Outcome::Page(StatusCode::CREATED, pages::created(url_path)))
}

pub async fn delete(path: &Path, url_path: &str) -> Result<Outcome, StatusCode> {
    let meta = fs::symlink_metadata(path).await.map_err(|e| status_for(&e))?;
    if meta.is_dir() {
        return Err(StatusCode::CONFLICT);
    }
    fs::remove_file(path).await.map_err(|e| status_for(&e))?;

    tracing::info!(path = %path.display(), "Deleted file");
    Ok(Outcome::Page(StatusCode::OK, pages::deleted(url_path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Location, VirtualHost};
    use crate::http::request::RequestBuilder;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("webserv-methods-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn host(root: &Path, autoindex: bool) -> VirtualHost {
        VirtualHost {
            root: root.to_path_buf(),
            autoindex,
            ..VirtualHost::default()
        }
    }

    #[tokio::test]
    async fn get_prefers_index_then_listing() {
        let dir = scratch("get");
        std::fs::create_dir(dir.join("docs")).unwrap();
        std::fs::write(dir.join("index.html"), "home").unwrap();

        let with_listing = host(&dir, true);
        let route = with_listing.route("/");
        assert!(matches!(
            get(&route, &dir).await,
            Ok(Outcome::File(p)) if p == dir.join("index.html")
        ));
        assert!(matches!(
            get(&route, &dir.join("docs")).await,
            Ok(Outcome::Listing(_))
        ));

        let without_listing = host(&dir, false);
        assert_eq!(
            get(&without_listing.route("/"), &dir.join("docs")).await.err(),
            Some(StatusCode::FORBIDDEN)
        );
        assert_eq!(
            get(&route, &dir.join("missing.html")).await.err(),
            Some(StatusCode::NOT_FOUND)
        );

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn location_index_overrides_host() {
        let dir = scratch("index");
        std::fs::write(dir.join("start.html"), "start").unwrap();

        let mut location = Location::new("/");
        location.index = Some(vec!["missing.html".into(), "start.html".into()]);
        let mut vhost = host(&dir, false);
        vhost.locations.push(location);

        assert!(matches!(
            get(&vhost.route("/"), &dir).await,
            Ok(Outcome::File(p)) if p == dir.join("start.html")
        ));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn post_stores_body() {
        let dir = scratch("post");
        let vhost = host(&dir, false);
        let route = vhost.route("/up.txt");
        let request = RequestBuilder::new()
            .method("POST")
            .path("/up.txt")
            .body(b"data".to_vec())
            .build()
            .unwrap();

        let outcome = post(&route, &dir.join("up.txt"), "/up.txt", &request).await;
        assert!(matches!(outcome, Ok(Outcome::Page(StatusCode::CREATED, _))));
        assert_eq!(std::fs::read(dir.join("up.txt")).unwrap(), b"data");

        assert_eq!(
            post(&route, &dir, "/", &request).await.err(),
            Some(StatusCode::CONFLICT)
        );
        assert_eq!(
            post(&route, &dir.join("nope/up.txt"), "/nope/up.txt", &request).await.err(),
            Some(StatusCode::NOT_FOUND)
        );
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn delete_removes_files_only() {
        let dir = scratch("delete");
        std::fs::write(dir.join("gone.txt"), "x").unwrap();
        std::fs::create_dir(dir.join("sub")).unwrap();

        assert!(matches!(
            delete(&dir.join("gone.txt"), "/gone.txt").await,
            Ok(Outcome::Page(StatusCode::OK, _))
        ));
        assert!(!dir.join("gone.txt").exists());
        assert_eq!(
            delete(&dir.join("gone.txt"), "/gone.txt").await.err(),
            Some(StatusCode::NOT_FOUND)
        );
        assert_eq!(
            delete(&dir.join("sub"), "/sub").await.err(),
            Some(StatusCode::CONFLICT)
        );
        std::fs::remove_dir_all(dir).unwrap();
    }
}
