use chrono::{DateTime, Utc};

/// Extension of every encoded episode
pub const AUDIO_EXTENSION: &str = "mp3";

/// Keep ids short enough that the whole filename stays well below path limits
const MAX_ID_LENGTH: usize = 100;

/// Generate a filename stem (without extension) for a playlist item
///
/// Format: "YYYY-MM-DD-<sanitized item id>", the date being the UTC publish day.
/// Depends only on the item id and publish time, so a re-listed item always
/// maps to the same file.
fn generate_filename_stem(item_id: &str, published_at: &DateTime<Utc>) -> String {
    format!("{}-{}", published_at.format("%Y-%m-%d"), sanitize_item_id(item_id))
}

/// Generate the complete audio filename for a playlist item
pub fn generate_filename(item_id: &str, published_at: &DateTime<Utc>) -> String {
    format!(
        "{}.{}",
        generate_filename_stem(item_id, published_at),
        AUDIO_EXTENSION
    )
}

fn sanitize_item_id(item_id: &str) -> String {
    let options = sanitize_filename::Options {
        windows: true,
        truncate: true,
        replacement: "_",
    };
    let sanitized = sanitize_filename::sanitize_with_options(item_id, options)
        .replace([' ', '.'], "_");

    let truncated: String = sanitized.chars().take(MAX_ID_LENGTH).collect();
    if truncated.is_empty() {
        "item".to_string()
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn youtube_ids_are_kept_verbatim() {
        assert_eq!(
            generate_filename("dQw4w9WgXcQ", &date(2024, 1, 15, 12)),
            "2024-01-15-dQw4w9WgXcQ.mp3"
        );
        assert_eq!(
            generate_filename_stem("a-b_c", &date(2024, 1, 15, 12)),
            "2024-01-15-a-b_c"
        );
    }

    #[test]
    fn date_prefix_uses_utc_day() {
        let published = chrono::DateTime::parse_from_rfc3339("2024-01-15T23:30:00-03:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(generate_filename_stem("x", &published), "2024-01-16-x");
    }

    #[test]
    fn path_separators_and_dots_are_replaced() {
        let stem = generate_filename_stem("../etc/passwd", &date(2024, 1, 1, 0));
        assert!(!stem.contains('/'));
        assert!(!stem.contains(".."));
        assert!(stem.starts_with("2024-01-01-"));
    }

    #[test]
    fn empty_id_gets_placeholder() {
        assert_eq!(generate_filename_stem("", &date(2024, 1, 1, 0)), "2024-01-01-item");
    }

    #[test]
    fn long_ids_are_truncated() {
        let id = "x".repeat(300);
        let stem = generate_filename_stem(&id, &date(2024, 1, 1, 0));
        assert_eq!(stem.len(), "2024-01-01-".len() + MAX_ID_LENGTH);
    }

    #[test]
    fn filename_is_stable() {
        let published = date(2024, 3, 3, 3);
        assert_eq!(
            generate_filename("abc", &published),
            generate_filename("abc", &published)
        );
    }
}
