use std::path::Path;

use chrono::Utc;

/// Saves an uploaded file under the configured upload directory with a
/// timestamped name and returns the relative path served at /uploads.
pub async fn save_upload(
    upload_dir: &str,
    original_name: &str,
    bytes: &[u8],
) -> anyhow::Result<String> {
    tokio::fs::create_dir_all(upload_dir).await?;

    let safe_name: String = Path::new(original_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let file_name = format!("{}_{safe_name}", Utc::now().timestamp_millis());
    let path = Path::new(upload_dir).join(&file_name);
    tokio::fs::write(&path, bytes).await?;
    Ok(format!("/uploads/{file_name}"))
}
