//! Hand-built multipart bodies for router tests

const BOUNDARY: &str = "labtrack-test-boundary";

/// Returns (content-type header, body) for a single `file` field
pub fn multipart_body(file_name: &str, mime_type: &str, contents: &[u8]) -> (String, Vec<u8>) {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
         Content-Type: {mime_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}
