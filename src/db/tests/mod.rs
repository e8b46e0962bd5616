mod close;

use crate::db::NewPublication;

/// Publication request for `name` in `/srv/repo`, next free version
pub(super) fn new_publication(name: &str) -> NewPublication {
    NewPublication {
        file_name: name.to_string(),
        repo_path: "/srv/repo".to_string(),
        version: None,
        owner: "alice".to_string(),
        contact: Some("alice@example.org".to_string()),
        email: None,
        source_path: format!("/srv/repo/{}", name),
    }
}
