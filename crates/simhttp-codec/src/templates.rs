use std::path::{Path, PathBuf};

const NOT_FOUND_FILE: &str = "http_404.html";
const SERVER_ERROR_FILE: &str = "http_500.html";

/// HTML error pages, optionally overridden by files in a directory.
///
/// Override files are read on every use so they can be edited while the
/// server runs. A missing or unreadable file falls back to the built-in page.
#[derive(Debug, Clone, Default)]
pub struct ErrorPages {
    dir: Option<PathBuf>,
}

impl ErrorPages {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// The 404 page. The built-in one tells viewers which login URI to use.
    pub fn not_found(&self, host: &str) -> String {
        self.load(NOT_FOUND_FILE)
            .unwrap_or_else(|| default_not_found(host))
    }

    pub fn server_error(&self) -> String {
        self.load(SERVER_ERROR_FILE)
            .unwrap_or_else(|| DEFAULT_SERVER_ERROR.to_string())
    }

    fn load(&self, name: &str) -> Option<String> {
        let path = self.dir.as_deref().map(|dir| dir.join(name))?;
        read_page(&path)
    }
}

fn read_page(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(page) => Some(page),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!("Could not read error page {}: {}", path.display(), e);
            None
        }
    }
}

fn default_not_found(host: &str) -> String {
    format!(
        "<HTML><HEAD><TITLE>404 Page not found</TITLE></HEAD><BODY><BR /><H1>Ooops!</H1>\
         <P>The page you requested could not be found.</P>\
         <P>If you are trying to log in, your viewer should be started with: \
         &quot;-loginpage http://{host}/?method=login -loginuri http://{host}/&quot;</P>\
         </BODY></HTML>"
    )
}

const DEFAULT_SERVER_ERROR: &str = "<HTML><HEAD><TITLE>500 Internal Server Error</TITLE></HEAD>\
<BODY><BR /><H1>Ooops!</H1><P>The server could not complete your request.</P></BODY></HTML>";
