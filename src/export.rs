use std::ffi::OsString;
use std::io;
use std::io::Read as _;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::PdfConfig;
use crate::error::ConversionError;

/// Converts a finished Markdown file to PDF by running pandoc.
#[derive(Debug, Clone)]
pub struct PdfExporter {
    pandoc: String,
    pdf_engines: Vec<String>,
    title: Option<String>,
    timeout: Duration,
}

impl PdfExporter {
    pub fn new(config: &PdfConfig) -> Self {
        Self {
            pandoc: config.pandoc.clone(),
            pdf_engines: config.pdf_engines.clone(),
            title: config.title.clone(),
            timeout: config.timeout,
        }
    }

    /// Runs pandoc once per configured PDF engine until one succeeds. With no
    /// engine configured pandoc picks its default.
    pub fn export(&self, input: &Path, out: &Path) -> Result<(), ConversionError> {
        if let Some(parent) = out.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| ConversionError::Io {
                program: self.pandoc.clone(),
                source,
            })?;
        }

        let engines: Vec<Option<&str>> = if self.pdf_engines.is_empty() {
            vec![None]
        } else {
            self.pdf_engines.iter().map(|e| Some(e.as_str())).collect()
        };

        let mut last_failure = None;
        for engine in engines {
            tracing::info!(
                pandoc = %self.pandoc,
                pdf_engine = engine.unwrap_or("default"),
                out = %out.display(),
                "export pdf via pandoc"
            );
            let args = self.build_pandoc_args(input, out, engine);
            match self.run_pandoc(&args) {
                Ok(()) => return Ok(()),
                Err(err @ ConversionError::Failed { .. }) => {
                    tracing::warn!(
                        pdf_engine = engine.unwrap_or("default"),
                        error = %err,
                        "pandoc failed"
                    );
                    last_failure = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_failure.unwrap_or_else(|| ConversionError::Failed {
            status: "not run".to_owned(),
            stderr: "no pdf engine candidates".to_owned(),
        }))
    }

    fn build_pandoc_args(
        &self,
        input: &Path,
        out: &Path,
        pdf_engine: Option<&str>,
    ) -> Vec<OsString> {
        let mut pandoc_args = Vec::new();
        pandoc_args.push(input.as_os_str().to_owned());
        pandoc_args.push(OsString::from("-o"));
        pandoc_args.push(out.as_os_str().to_owned());

        if let Some(parent) = input.parent()
            && !parent.as_os_str().is_empty()
        {
            pandoc_args.push(OsString::from("--resource-path"));
            pandoc_args.push(parent.as_os_str().to_owned());
        }

        pandoc_args.push(OsString::from("--from"));
        pandoc_args.push(OsString::from("gfm-tex_math_dollars+attributes"));

        if let Some(engine) = pdf_engine {
            pandoc_args.push(OsString::from("--pdf-engine"));
            pandoc_args.push(OsString::from(engine));
        }

        if let Some(title) = &self.title {
            pandoc_args.push(OsString::from("--metadata"));
            pandoc_args.push(OsString::from(format!("title={title}")));
        }

        pandoc_args
    }

    fn run_pandoc(&self, args: &[OsString]) -> Result<(), ConversionError> {
        let mut child = Command::new(&self.pandoc)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => ConversionError::NotFound {
                    program: self.pandoc.clone(),
                },
                _ => ConversionError::Io {
                    program: self.pandoc.clone(),
                    source: err,
                },
            })?;

        // stderr is drained while waiting; the child must never block on it.
        let stderr = child.stderr.take();
        let stderr_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut buf);
            }
            String::from_utf8_lossy(&buf).into_owned()
        });

        let status = match wait_with_deadline(&mut child, self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ConversionError::TimedOut {
                    secs: self.timeout.as_secs(),
                });
            }
            Err(source) => {
                return Err(ConversionError::Io {
                    program: self.pandoc.clone(),
                    source,
                });
            }
        };

        let stderr = stderr_reader.join().unwrap_or_default();
        if !status.success() {
            return Err(ConversionError::Failed {
                status: status.to_string(),
                stderr: stderr.trim().to_owned(),
            });
        }
        Ok(())
    }
}

fn wait_with_deadline(
    child: &mut std::process::Child,
    timeout: Duration,
) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(Duration::from_millis(50));
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn exporter(pandoc: &str) -> PdfExporter {
        PdfExporter::new(&PdfConfig {
            out: PathBuf::from("manual.pdf"),
            pandoc: pandoc.to_owned(),
            pdf_engines: Vec::new(),
            title: Some("Manual".to_owned()),
            timeout: Duration::from_secs(5),
            images_dir: None,
        })
    }

    #[test]
    fn pandoc_args_carry_paths_and_options() {
        let args = exporter("pandoc").build_pandoc_args(
            Path::new("out/manual.md"),
            Path::new("out/manual.pdf"),
            Some("tectonic"),
        );
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "out/manual.md",
                "-o",
                "out/manual.pdf",
                "--resource-path",
                "out",
                "--from",
                "gfm-tex_math_dollars+attributes",
                "--pdf-engine",
                "tectonic",
                "--metadata",
                "title=Manual",
            ]
        );
    }

    #[test]
    fn missing_converter_is_reported_and_markdown_untouched() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let md = temp.path().join("manual.md");
        std::fs::write(&md, "# Manual\n")?;

        let err = exporter("/nonexistent/bin/pandoc-missing")
            .export(&md, &temp.path().join("manual.pdf"))
            .unwrap_err();

        assert!(matches!(err, ConversionError::NotFound { .. }));
        assert_eq!(std::fs::read_to_string(&md)?, "# Manual\n");
        assert!(!temp.path().join("manual.pdf").exists());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn slow_converter_is_killed_at_the_deadline() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt as _;

        let temp = tempfile::TempDir::new()?;
        let md = temp.path().join("manual.md");
        std::fs::write(&md, "# Manual\n")?;
        let pandoc = temp.path().join("slow-pandoc");
        std::fs::write(&pandoc, "#!/bin/sh\nexec sleep 30\n")?;
        std::fs::set_permissions(&pandoc, std::fs::Permissions::from_mode(0o755))?;

        let exporter = PdfExporter::new(&PdfConfig {
            out: temp.path().join("manual.pdf"),
            pandoc: pandoc.to_string_lossy().into_owned(),
            pdf_engines: Vec::new(),
            title: None,
            timeout: Duration::from_secs(1),
            images_dir: None,
        });

        let started = Instant::now();
        let err = exporter
            .export(&md, &temp.path().join("manual.pdf"))
            .unwrap_err();
        assert!(matches!(err, ConversionError::TimedOut { secs: 1 }), "{err}");
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(std::fs::read_to_string(&md)?, "# Manual\n");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_a_failure() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let md = temp.path().join("manual.md");
        std::fs::write(&md, "# Manual\n")?;

        let err = exporter("false")
            .export(&md, &temp.path().join("manual.pdf"))
            .unwrap_err();
        assert!(matches!(err, ConversionError::Failed { .. }));
        Ok(())
    }
}
