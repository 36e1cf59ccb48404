//! Minimal documentation site served over HTTP for end-to-end runs.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

pub const INDEX: &str = r#"<!doctype html>
<html>
  <head><title>Manual</title></head>
  <body>
    <nav>
      <a class="page-link" href="/docs/intro">Introduction</a>
      <a class="page-link" href="/docs/intro#first-steps">First steps</a>
      <a class="page-link" href="/docs/broken">Broken page</a>
      <a class="page-link" href="/docs/missing">Missing page</a>
      <a class="page-link" href="/docs/advanced">Advanced</a>
      <a class="other" href="/docs/faq">FAQ</a>
    </nav>
  </body>
</html>
"#;

const INTRO: &str = r#"<!doctype html>
<html>
  <head><title>Introduction</title></head>
  <body>
    <main class="sl-markdown-content">
      <h1>Introduction</h1>
      <p>Intro body. Continue with <a href="/docs/advanced">advanced topics</a>.</p>
      <pre data-language="pine"><code><div class="ec-line">//@version=6</div><div class="ec-line">plot(close)</div></code></pre>
    </main>
  </body>
</html>
"#;

const BROKEN: &str = r#"<!doctype html>
<html><body><p>Maintenance in progress</p></body></html>
"#;

const ADVANCED: &str = r#"<!doctype html>
<html>
  <head><title>Advanced</title></head>
  <body>
    <main class="sl-markdown-content">
      <h1>Advanced</h1>
      <p>Advanced body.</p>
      <p><img src="/docs/img/chart.webp" alt="Chart"></p>
    </main>
  </body>
</html>
"#;

pub struct DocsServer {
    pub base_url: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    shutdown: mpsc::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl DocsServer {
    /// Serves the full site.
    pub fn start() -> Self {
        Self::start_with(false)
    }

    /// Serves an index whose chapters all fail.
    pub fn start_broken() -> Self {
        Self::start_with(true)
    }

    fn start_with(all_broken: bool) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
        let base_url = format!("http://{}", server.server_addr());
        let hits = Arc::new(Mutex::new(HashMap::new()));
        let (shutdown, shutdown_rx) = mpsc::channel::<()>();
        let webp = webp_fixture();

        let server_hits = Arc::clone(&hits);
        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().split('?').next().unwrap_or_default().to_owned();
                *server_hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

                let (status, body): (u16, Vec<u8>) = match (path.as_str(), all_broken) {
                    ("/docs/", true) => (
                        200,
                        r#"<a class="page-link" href="/docs/broken">Broken</a>
<a class="page-link" href="/docs/missing">Missing</a>"#
                            .into(),
                    ),
                    ("/docs/", false) => (200, INDEX.into()),
                    ("/docs/intro", _) => (200, INTRO.into()),
                    ("/docs/broken", _) => (200, BROKEN.into()),
                    ("/docs/advanced", _) => (200, ADVANCED.into()),
                    ("/docs/img/chart.webp", _) => (200, webp.clone()),
                    _ => (404, b"not found".to_vec()),
                };

                let _ = request.respond(tiny_http::Response::from_data(body).with_status_code(status));
            }
        });

        Self {
            base_url,
            hits,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn index_url(&self) -> String {
        format!("{}/docs/", self.base_url)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.lock().unwrap().values().sum()
    }

    pub fn reset_hits(&self) {
        self.hits.lock().unwrap().clear();
    }
}

impl Drop for DocsServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn webp_fixture() -> Vec<u8> {
    let img = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
        2,
        2,
        image::Rgba([200, 30, 30, 255]),
    ));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::WebP)
        .expect("encode webp fixture");
    bytes
}
