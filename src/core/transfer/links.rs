// String helpers for the identifiers the UI hands us: editor page URLs and
// Drive share links. Plain string slicing; both formats are stable.

/// Extracts the project id from an editor URL such as
/// `https://www.overleaf.com/project/64f0c1e2a9/detached`.
pub fn project_id_from_url(url: &str) -> Option<String> {
    let start = url.find("/project/")?;
    let after = &url[start + "/project/".len()..];
    let end = after.find(['/', '?', '#']).unwrap_or(after.len());
    let id = &after[..end];
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// True for pages the side panel is enabled on.
pub fn is_project_page(url: &str) -> bool {
    url.starts_with("https://") && project_id_from_url(url).is_some()
}

/// Extracts a Drive file id from a share link (`.../d/<id>/view`,
/// `...open?id=<id>`) or accepts a bare id.
pub fn drive_file_id_from_link(link: &str) -> Option<String> {
    let link = link.trim();

    if let Some(start) = link.find("/d/") {
        let after = &link[start + 3..];
        let end = after.find(['/', '?', '#']).unwrap_or(after.len());
        let id = &after[..end];
        return is_drive_file_id(id).then(|| id.to_string());
    }

    if let Some(query_start) = link.find('?') {
        let query = &link[query_start + 1..];
        let query = query.split('#').next().unwrap_or(query);
        return query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "id")
            .map(|(_, value)| value.to_string())
            .filter(|id| is_drive_file_id(id));
    }

    is_drive_file_id(link).then(|| link.to_string())
}

/// Drive ids are URL-safe base64-ish tokens. Anything else must never reach
/// a request path.
pub fn is_drive_file_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Remote file name for a project: its display name plus `.pdf`.
pub fn pdf_file_name(name: &str) -> String {
    let name = name.trim();
    if name.to_ascii_lowercase().ends_with(".pdf") {
        name.to_string()
    } else {
        format!("{}.pdf", name)
    }
}
