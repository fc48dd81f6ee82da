use axum::extract::Multipart;

use tocgen_ingest::DocumentKind;

use crate::error::ApiError;

/// An uploaded document with its data and detected kind.
pub struct UploadedFile {
    pub filename: String,
    pub data: Vec<u8>,
    pub kind: DocumentKind,
}

/// Pull the document out of a multipart upload. The file may be sent as
/// `document` or `file`; other fields are ignored.
pub async fn parse_multipart(mut multipart: Multipart) -> Result<UploadedFile, ApiError> {
    let mut file: Option<UploadedFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read form field: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "document" | "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file data: {e}")))?
                    .to_vec();

                if data.is_empty() {
                    return Err(ApiError::bad_request("Uploaded file is empty"));
                }
                let kind = tocgen_ingest::detect_kind(&filename, &data)?;

                file = Some(UploadedFile {
                    filename,
                    data,
                    kind,
                });
            }
            _ => {
                let _ = field.bytes().await;
            }
        }
    }

    file.ok_or_else(|| ApiError::bad_request("No file uploaded"))
}
