/// Form of a RoadRunner server reference, which decides the archive URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerRef<'a> {
    /// Starts with `v`
    Tag(&'a str),
    /// 40 hex characters
    Commit(&'a str),
    /// Anything else
    Branch(&'a str),
}

impl<'a> ServerRef<'a> {
    pub fn classify(reference: &'a str) -> Self {
        if reference.starts_with('v') {
            ServerRef::Tag(reference)
        } else if reference.len() == 40 && reference.bytes().all(|b| b.is_ascii_hexdigit()) {
            ServerRef::Commit(reference)
        } else {
            ServerRef::Branch(reference)
        }
    }

    /// Archive URL under `repo_url` (e.g. `https://github.com/roadrunner-server/roadrunner`)
    pub fn archive_url(&self, repo_url: &str, extension: &str) -> String {
        let repo_url = repo_url.trim_end_matches('/');
        match self {
            ServerRef::Tag(tag) => format!("{repo_url}/archive/refs/tags/{tag}.{extension}"),
            ServerRef::Commit(sha) => format!("{repo_url}/archive/{sha}.{extension}"),
            ServerRef::Branch(branch) => format!("{repo_url}/archive/refs/heads/{branch}.{extension}"),
        }
    }
}

/// Directory name the server template is unpacked under
pub fn template_dir_name(reference: &str) -> String {
    format!("roadrunner-server-{}", reference.replace('/', "_"))
}
