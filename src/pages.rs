use htmlescape::encode_minimal;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Public URL of a stored upload.
pub fn upload_link(stored_name: &str) -> String {
    format!("/uploads/{}", utf8_percent_encode(stored_name, URI_COMPONENT))
}

pub fn error_page(status: u16, reason: &str, message: &str) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>
<html>
<head>
    <meta charset=\"utf-8\">
    <title> Error processing your request </title>
</head>
<body>
",
    );
    html.push_str(&format!("    <h1>{} {}</h1>\n", status, encode_minimal(reason)));
    html.push_str(&format!("    <p>{}</p>\n", encode_minimal(message)));
    html.push_str("    <a href=\"/\">Go back to the main page</a>\n</body>\n</html>\n");
    html
}

pub fn upload_success_page(original_name: &str, stored_name: &str) -> String {
    let link = upload_link(stored_name);
    format!(
        "<!DOCTYPE html>
<html>
<head>
    <meta charset=\"utf-8\">
    <title> Upload complete </title>
</head>
<body>
    <h1>Upload complete</h1>
    <p>{} was stored as <a href=\"{}\">{}</a></p>
    <a href=\"/\">Upload another file</a>
</body>
</html>
",
        encode_minimal(original_name),
        encode_minimal(&link),
        encode_minimal(stored_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_is_encoded_like_a_uri_component() {
        assert_eq!(upload_link("1700-report.pdf"), "/uploads/1700-report.pdf");
        assert_eq!(upload_link("1-a b&c?.txt"), "/uploads/1-a%20b%26c%3F.txt");
        assert_eq!(upload_link("1-café.txt"), "/uploads/1-caf%C3%A9.txt");
    }

    #[test]
    fn pages_escape_client_text() {
        let html = upload_success_page("<script>.txt", "1-x.txt");
        assert!(!html.contains("<script>"));
        assert!(html.contains("href=\"/uploads/1-x.txt\""));

        let html = error_page(404, "Not Found", "<b>");
        assert!(html.contains("<h1>404 Not Found</h1>"));
        assert!(html.contains("&lt;b&gt;"));
    }
}
