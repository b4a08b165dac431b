/// Characters that cannot appear in a file name on common filesystems
const FORBIDDEN: [char; 9] = ['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Strips characters that are not allowed in file names. Used wherever a
/// video title becomes a path component.
pub fn sanitize_filename(name: &str) -> String {
    name.chars().filter(|c| !FORBIDDEN.contains(c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_only_forbidden_characters() {
        assert_eq!(sanitize_filename(r#"a\b/c*d?e:f"g<h>i|j"#), "abcdefghij");
        assert_eq!(sanitize_filename("Song (Live) - 2024 [HD]!"), "Song (Live) - 2024 [HD]!");
        assert_eq!(sanitize_filename("Ünïcödé ✓"), "Ünïcödé ✓");
    }

    #[test]
    fn is_idempotent() {
        for title in ["What? No: way", "", "<<>>", "plain", "a/b\\c"] {
            let once = sanitize_filename(title);
            assert_eq!(sanitize_filename(&once), once);
        }
    }
}
