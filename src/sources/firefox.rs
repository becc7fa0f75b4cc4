use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use chrono::DateTime;
use homedir::my_home;
use rusqlite::{params, Connection, OpenFlags};

use super::{window, BookmarkSource};
use crate::{
    bookmarks::{dedup_by_url, Bookmark},
    config::{CookieStealing, GeneralConfig},
    scrape::CookieJar,
};

const PLACES_QUERY: &str = "
SELECT
    b.title,
    parent.title,
    p.url,
    (CASE
        WHEN b.dateAdded = 0 AND b.lastModified <> 0 THEN b.lastModified
        WHEN b.dateAdded <> 0 THEN b.dateAdded
        ELSE 1 END
    ) / 1000000 AS dateAdded
FROM moz_places p
JOIN moz_bookmarks b ON p.id = b.fk
JOIN moz_bookmarks parent ON b.parent = parent.id
WHERE b.title IS NOT NULL
  AND (p.url LIKE 'http://%' OR p.url LIKE 'https://%')
ORDER BY b.id
";

const COOKIES_QUERY: &str = "SELECT name, value FROM moz_cookies WHERE host LIKE ?1 ORDER BY id";

pub struct FirefoxSource {
    places: PathBuf,
    cookies: Option<PathBuf>,
    stealings: Vec<CookieStealing>,
    skip: Option<usize>,
    limit: Option<usize>,
}

impl FirefoxSource {
    pub fn from_config(config: &GeneralConfig) -> anyhow::Result<Self> {
        let places = match &config.places_file_path {
            Some(p) => p.clone(),
            None => default_profile_dir()?.join("places.sqlite"),
        };

        let cookies = config.cookies_file_path.clone().or_else(|| {
            places
                .parent()
                .map(|dir| dir.join("cookies.sqlite"))
                .filter(|p| p.exists())
        });

        Ok(Self {
            places,
            cookies,
            stealings: config.cookie_stealings.clone(),
            skip: config.skip_queried_bookmarks,
            limit: config.limit_of_queried_bookmarks,
        })
    }
}

/// Opens a private copy of a browser database, which may be locked while
/// the browser runs. The copy lives as long as the returned handle.
fn open_copy(path: &Path) -> anyhow::Result<(tempfile::TempPath, Connection)> {
    let copy = tempfile::Builder::new()
        .suffix(".sqlite")
        .tempfile()?
        .into_temp_path();

    std::fs::copy(path, &copy).with_context(|| format!("copying {}", path.display()))?;

    let conn = Connection::open_with_flags(&copy, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("opening {}", path.display()))?;

    Ok((copy, conn))
}

fn read_places(conn: &Connection) -> anyhow::Result<Vec<Bookmark>> {
    let mut stmt = conn.prepare(PLACES_QUERY)?;
    let rows = stmt.query_map([], |row| {
        let title: String = row.get(0)?;
        let folder: Option<String> = row.get(1)?;
        let url: String = row.get(2)?;
        let date_added: i64 = row.get(3)?;
        Ok((title, folder, url, date_added))
    })?;

    let mut bookmarks = Vec::new();
    for row in rows {
        let (title, folder, url, date_added) = row?;
        let date_added = DateTime::from_timestamp(date_added, 0).unwrap_or_default();
        let folder = folder.filter(|f| !f.is_empty());
        bookmarks.push(Bookmark::new(url, title, folder, date_added));
    }

    let mut bookmarks = dedup_by_url(bookmarks);
    bookmarks.sort_by(|a, b| b.date_added.cmp(&a.date_added));

    Ok(bookmarks)
}

fn read_cookie_header(conn: &Connection, host_like: &str) -> anyhow::Result<String> {
    let mut stmt = conn.prepare(COOKIES_QUERY)?;
    let pairs = stmt
        .query_map(params![host_like], |row| {
            Ok(format!("{}={}", row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(pairs.join("; "))
}

impl BookmarkSource for FirefoxSource {
    fn name(&self) -> &'static str {
        "firefox"
    }

    fn bookmarks(&self) -> anyhow::Result<Vec<Bookmark>> {
        log::info!("reading bookmarks from {}", self.places.display());

        let (_copy, conn) = open_copy(&self.places)?;
        let bookmarks = read_places(&conn)?;

        log::info!("{} bookmarks read", bookmarks.len());

        Ok(window(bookmarks, self.skip, self.limit))
    }

    fn cookies(&self) -> anyhow::Result<CookieJar> {
        let mut jar = CookieJar::default();
        if self.stealings.is_empty() {
            return Ok(jar);
        }

        let Some(path) = &self.cookies else {
            log::warn!("cookie stealing configured but no cookies database found");
            return Ok(jar);
        };

        let (_copy, conn) = open_copy(path)?;
        for stealing in &self.stealings {
            let header = read_cookie_header(&conn, &stealing.where_host_like)?;
            if header.is_empty() {
                log::warn!("no cookies for hosts like {:?}", stealing.where_host_like);
                continue;
            }
            log::debug!("using cookies of {:?} for {}", stealing.where_host_like, stealing.for_url);
            jar.insert(stealing.for_url.clone(), header);
        }

        Ok(jar)
    }
}

fn firefox_dir() -> anyhow::Result<PathBuf> {
    let home = my_home()
        .map_err(|err| anyhow!("Could not determine home directory: {err:?}"))?
        .ok_or_else(|| anyhow!("home directory not found"))?;

    Ok(if cfg!(target_os = "windows") {
        std::env::var("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join("AppData").join("Roaming"))
            .join("Mozilla")
            .join("Firefox")
    } else if cfg!(target_os = "macos") {
        home.join("Library/Application Support/Firefox")
    } else {
        home.join(".mozilla/firefox")
    })
}

/// First profile listed in `profiles.ini`.
fn default_profile_dir() -> anyhow::Result<PathBuf> {
    let firefox = firefox_dir()?;
    let ini_path = firefox.join("profiles.ini");
    let ini = std::fs::read_to_string(&ini_path)
        .with_context(|| format!("firefox profiles not found at {}", ini_path.display()))?;

    profile_path(&ini, &firefox).ok_or_else(|| anyhow!("no profile in {}", ini_path.display()))
}

fn profile_path(ini: &str, firefox_dir: &Path) -> Option<PathBuf> {
    let mut relative = true;
    let mut path = None;

    for line in ini.lines().map(str::trim) {
        if line.starts_with('[') && path.is_some() {
            break;
        }
        if let Some(p) = line.strip_prefix("Path=") {
            path = Some(p.to_string());
        } else if let Some(r) = line.strip_prefix("IsRelative=") {
            relative = r != "0";
        }
    }

    let path = PathBuf::from(path?);
    Some(if relative { firefox_dir.join(path) } else { path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_path() {
        let ini = "[General]\nStartWithLastProfile=1\n\n[Profile0]\nName=default\nIsRelative=1\nPath=abcd.default\n\n[Profile1]\nPath=other\n";
        assert_eq!(
            profile_path(ini, Path::new("/ff")),
            Some(PathBuf::from("/ff/abcd.default"))
        );

        let ini = "[Profile0]\nIsRelative=0\nPath=/abs/profile\n";
        assert_eq!(
            profile_path(ini, Path::new("/ff")),
            Some(PathBuf::from("/abs/profile"))
        );

        assert_eq!(profile_path("[General]\n", Path::new("/ff")), None);
    }
}
