use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::{create_dir_all, remove_file, rename, File};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::{Error, Result};
use crate::layers::Submission;

const CHUNK_SIZE: usize = 8192;

/// Stripped from file names. Includes `.` and `,`, so extensions go too.
const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', '.', ','];

pub fn sanitize_file_name(file_name: &str) -> String {
    file_name
        .chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c))
        .collect()
}

/// Text after the last `/` of `url`, query included, with a `.pdf` suffix ensured.
///
/// Keeping the query gives `pdf?id=X` links a distinct name per id.
pub fn file_name_from_url(url: &str) -> String {
    let segment = url.rsplit('/').next().unwrap_or_default().to_string();

    if segment.ends_with(".pdf") {
        segment
    } else {
        format!("{}.pdf", segment)
    }
}

async fn write_body(response: reqwest::Response, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path).await?;
    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        writer.write_all(&chunk?).await?;
    }
    writer.flush().await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub url: String,
    pub file_name: Option<String>,
}

impl From<&Submission> for DownloadJob {
    fn from(submission: &Submission) -> Self {
        Self {
            url: submission.pdf_link.clone(),
            file_name: Some(submission.title.clone()),
        }
    }
}

#[derive(Debug, Default)]
pub struct DownloadSummary {
    pub saved: Vec<PathBuf>,
    /// `(url, cause)` for every job that did not complete.
    pub failed: Vec<(String, String)>,
}

pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetches `url` into `destination_dir`, overwriting any file of the same name.
    pub async fn download(
        &self,
        url: &str,
        destination_dir: impl AsRef<Path>,
        file_name: Option<&str>,
    ) -> Result<PathBuf> {
        let dir = destination_dir.as_ref();
        create_dir_all(dir)
            .await
            .map_err(|e| Error::download(url, format!("cannot create {}: {}", dir.display(), e)))?;

        let resolved = match file_name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => file_name_from_url(url),
        };
        let sanitized = sanitize_file_name(&resolved);
        if sanitized.is_empty() {
            return Err(Error::download(
                url,
                format!("file name {:?} is empty once sanitized", resolved),
            ));
        }
        let file_path = dir.join(&sanitized);

        tracing::info!("Downloading PDF from: {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| Error::download(url, e))?;

        // Sanitized names never contain '.', so the partial path cannot clash with a real file
        let part_path = dir.join(format!("{}.part", sanitized));
        if let Err(e) = write_body(response, &part_path).await {
            if let Err(cleanup) = remove_file(&part_path).await {
                tracing::warn!("Could not remove {}: {}", part_path.display(), cleanup);
            }
            return Err(Error::download(url, e));
        }
        rename(&part_path, &file_path)
            .await
            .map_err(|e| Error::download(url, e))?;

        Ok(file_path)
    }

    /// Runs every job in order. A failed job is logged and recorded, never fatal.
    pub async fn download_all(
        &self,
        jobs: &[DownloadJob],
        destination_dir: impl AsRef<Path>,
    ) -> DownloadSummary {
        let dir = destination_dir.as_ref();
        let mut summary = DownloadSummary::default();

        for (i, job) in jobs.iter().enumerate() {
            match self.download(&job.url, dir, job.file_name.as_deref()).await {
                Ok(path) => {
                    tracing::info!("[{}/{}] Saved to: {}", i + 1, jobs.len(), path.display());
                    summary.saved.push(path);
                }
                Err(e) => {
                    tracing::error!("[{}/{}] {}", i + 1, jobs.len(), e);
                    summary.failed.push((job.url.clone(), e.to_string()));
                }
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::sample_submission;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PDF_BYTES: &[u8] = b"%PDF-1.4\n%test\n";

    #[test]
    fn test_sanitize_strips_exact_set() {
        assert_eq!(sanitize_file_name("My:Paper/Title.pdf"), "MyPaperTitlepdf");
        assert_eq!(sanitize_file_name(r#"a<b>c:d"e/f\g|h?i*j.k,l"#), "abcdefghijkl");
        assert_eq!(sanitize_file_name("paper.v2"), "paperv2");
        assert_eq!(sanitize_file_name("Safe RL - a (new) view!"), "Safe RL - a (new) view!");
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(file_name_from_url("https://arxiv.org/pdf/2301.00101.pdf"), "2301.00101.pdf");
        assert_eq!(file_name_from_url("https://example.org/files/paper"), "paper.pdf");
        assert_eq!(file_name_from_url("https://openreview.net/pdf?id=abc"), "pdf?id=abc.pdf");
    }

    #[test]
    fn test_openreview_links_get_distinct_names() {
        let a = sanitize_file_name(&file_name_from_url("https://openreview.net/pdf?id=abc"));
        let b = sanitize_file_name(&file_name_from_url("https://openreview.net/pdf?id=xyz"));

        assert_eq!(a, "pdfid=abcpdf");
        assert_eq!(b, "pdfid=xyzpdf");
        assert_ne!(a, b);
    }

    #[test]
    fn test_job_from_submission() {
        let sub = sample_submission("abc", "Safe RL", "");
        let job = DownloadJob::from(&sub);
        assert_eq!(job.url, "https://openreview.net/pdf?id=abc");
        assert_eq!(job.file_name.as_deref(), Some("Safe RL"));
    }

    #[tokio::test]
    async fn test_download_named_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PDF_BYTES))
            .mount(&server)
            .await;

        let temp_dir = tempfile::tempdir().unwrap();
        let dest = temp_dir.path().join("nested").join("dir");
        let url = format!("{}/pdf?id=abc", server.uri());

        let downloader = Downloader::new(Client::new());
        let saved = downloader
            .download(&url, &dest, Some("My:Paper/Title.pdf"))
            .await
            .unwrap();

        assert_eq!(saved, dest.join("MyPaperTitlepdf"));
        assert_eq!(std::fs::read(&saved).unwrap(), PDF_BYTES);
    }

    #[tokio::test]
    async fn test_download_name_from_url_overwrites() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pdf/2301.00101.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PDF_BYTES))
            .mount(&server)
            .await;

        let temp_dir = tempfile::tempdir().unwrap();
        let existing = temp_dir.path().join("230100101pdf");
        std::fs::write(&existing, b"stale").unwrap();

        let downloader = Downloader::new(Client::new());
        let url = format!("{}/pdf/2301.00101.pdf", server.uri());
        let saved = downloader.download(&url, temp_dir.path(), None).await.unwrap();

        assert_eq!(saved, existing);
        assert_eq!(std::fs::read(&saved).unwrap(), PDF_BYTES);
    }

    #[tokio::test]
    async fn test_http_error_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let temp_dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(Client::new());
        let url = format!("{}/missing", server.uri());
        let err = downloader
            .download(&url, temp_dir.path(), Some("gone"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Download { url: ref u, .. } if *u == url));
        assert!(!temp_dir.path().join("gone").exists());
    }

    #[tokio::test]
    async fn test_empty_sanitized_name_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(Client::new());

        let err = downloader
            .download("http://127.0.0.1:9/x.pdf", temp_dir.path(), Some("..."))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Download { .. }));
    }

    #[tokio::test]
    async fn test_batch_continues_past_failure() {
        let server = MockServer::start().await;
        for (route, status) in [("/one", 200u16), ("/two", 500), ("/three", 200)] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(status).set_body_bytes(PDF_BYTES))
                .expect(1)
                .mount(&server)
                .await;
        }

        let jobs: Vec<DownloadJob> = ["one", "two", "three"]
            .iter()
            .map(|name| DownloadJob {
                url: format!("{}/{}", server.uri(), name),
                file_name: Some(name.to_string()),
            })
            .collect();

        let temp_dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(Client::new());
        let summary = downloader.download_all(&jobs, temp_dir.path()).await;

        assert_eq!(
            summary.saved,
            vec![temp_dir.path().join("one"), temp_dir.path().join("three")]
        );
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, jobs[1].url);
        assert!(summary.failed[0].1.contains("500"));
        assert!(!temp_dir.path().join("two").exists());
    }

    #[tokio::test]
    async fn test_batch_continues_past_connection_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PDF_BYTES))
            .expect(2)
            .mount(&server)
            .await;

        // Nothing listens on the discard port
        let unreachable = "http://127.0.0.1:9/x".to_string();
        let jobs = vec![
            DownloadJob { url: format!("{}/first", server.uri()), file_name: Some("first".to_string()) },
            DownloadJob { url: unreachable.clone(), file_name: Some("middle".to_string()) },
            DownloadJob { url: format!("{}/last", server.uri()), file_name: Some("last".to_string()) },
        ];

        let temp_dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(Client::new());
        let summary = downloader.download_all(&jobs, temp_dir.path()).await;

        assert_eq!(
            summary.saved,
            vec![temp_dir.path().join("first"), temp_dir.path().join("last")]
        );
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, unreachable);
        assert!(summary.failed[0].1.contains(&unreachable));
        assert!(!temp_dir.path().join("middle").exists());
    }

    #[tokio::test]
    async fn test_successful_download_leaves_no_partial_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PDF_BYTES))
            .mount(&server)
            .await;

        let temp_dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(Client::new());
        let url = format!("{}/paper", server.uri());
        downloader.download(&url, temp_dir.path(), Some("paper")).await.unwrap();

        assert!(temp_dir.path().join("paper").exists());
        assert!(!temp_dir.path().join("paper.part").exists());
    }

    #[tokio::test]
    async fn test_truncated_body_leaves_no_file() {
        use tokio::io::AsyncWriteExt;
        use tokio::net::TcpListener;

        // Promises 1000 bytes, sends a few, then hangs up
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut request = [0u8; 1024];
                let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut request).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n%PDF-1.4 partial")
                    .await;
                let _ = socket.shutdown().await;
            }
        });

        let temp_dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(Client::new());
        let url = format!("http://{}/paper", addr);
        let err = downloader
            .download(&url, temp_dir.path(), Some("paper"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Download { url: ref u, .. } if *u == url));
        assert!(!temp_dir.path().join("paper").exists());
        assert!(!temp_dir.path().join("paper.part").exists());
    }
}
