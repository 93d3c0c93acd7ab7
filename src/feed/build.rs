// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use rss::extension::itunes::ITunesChannelExtension;
use rss::{Channel, Enclosure, Guid, Image, Item};
use tracing::warn;
use url::Url;

use crate::atomic::write_atomically;
use crate::config::{MissingAudioPolicy, Show};
use crate::error::FeedError;
use crate::history::EpisodeRecord;
use crate::state::OutputState;

/// Feed document name inside each show directory
pub const FEED_FILENAME: &str = "feed.xml";

const AUDIO_MIME_TYPE: &str = "audio/mpeg";

/// A rendered RSS document for one show
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDocument {
    pub xml: String,
    /// Number of `<item>` entries
    pub entries: usize,
    /// Recorded episodes whose audio file was not on disk
    pub missing_audio: Vec<String>,
}

fn show_base_url(base_public_url: &Url, show_id: &str) -> Result<Url, FeedError> {
    let path = format!("{show_id}/");
    base_public_url
        .join(&path)
        .map_err(|e| FeedError::InvalidUrl { path, source: e })
}

fn join_url(base: &Url, path: &str) -> Result<Url, FeedError> {
    base.join(path).map_err(|e| FeedError::InvalidUrl {
        path: path.to_string(),
        source: e,
    })
}

/// Public URL of a show's feed document
pub fn feed_url(base_public_url: &Url, show_id: &str) -> Result<Url, FeedError> {
    join_url(&show_base_url(base_public_url, show_id)?, FEED_FILENAME)
}

/// Render the feed for `show` from its episode records
///
/// Entries are ordered newest first (ties broken by item id), and nothing
/// time-dependent is emitted, so identical inputs give byte-identical output.
/// Episodes whose audio file is absent from `inventory` are handled according
/// to `missing_audio`.
pub fn build_feed(
    show: &Show,
    base_public_url: &Url,
    episodes: &[&EpisodeRecord],
    inventory: &OutputState,
    missing_audio: MissingAudioPolicy,
) -> Result<FeedDocument, FeedError> {
    let missing = |field| FeedError::MissingMetadata {
        show_id: show.id.clone(),
        field,
    };
    if show.title.trim().is_empty() {
        return Err(missing("title"));
    }
    if show.description.trim().is_empty() {
        return Err(missing("description"));
    }

    let show_url = show_base_url(base_public_url, &show.id)?;
    let self_url = join_url(&show_url, FEED_FILENAME)?;

    let mut ordered: Vec<&EpisodeRecord> = episodes.to_vec();
    ordered.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });

    let mut items = Vec::with_capacity(ordered.len());
    let mut missing_files = Vec::new();

    for episode in ordered {
        let length = match inventory.audio_size(&episode.audio_filename) {
            Some(size) => size,
            None => {
                warn!(
                    show_id = %show.id,
                    item_id = %episode.item_id,
                    file = %episode.audio_filename,
                    "Recorded episode has no audio file on disk"
                );
                missing_files.push(episode.audio_filename.clone());
                match missing_audio {
                    MissingAudioPolicy::Omit => continue,
                    MissingAudioPolicy::Keep => 0,
                }
            }
        };

        let enclosure_url = join_url(&show_url, &episode.audio_filename)?;
        items.push(build_item(episode, &enclosure_url, length));
    }

    let mut channel = Channel::default();
    channel.set_title(show.title.clone());
    channel.set_link(self_url.to_string());
    channel.set_description(show.description.clone());
    channel.set_generator(Some("yt2pod".to_string()));

    if let Some(image_url) = &show.image_url {
        let mut image = Image::default();
        image.set_url(image_url.to_string());
        image.set_title(show.title.clone());
        image.set_link(self_url.to_string());
        channel.set_image(Some(image));

        let mut itunes = ITunesChannelExtension::default();
        itunes.set_image(Some(image_url.to_string()));
        channel.set_itunes_ext(Some(itunes));
    }

    let entries = items.len();
    channel.set_items(items);

    let bytes = channel.pretty_write_to(Vec::new(), b' ', 2)?;

    Ok(FeedDocument {
        xml: String::from_utf8_lossy(&bytes).into_owned(),
        entries,
        missing_audio: missing_files,
    })
}

fn build_item(episode: &EpisodeRecord, enclosure_url: &Url, length: u64) -> Item {
    let mut enclosure = Enclosure::default();
    enclosure.set_url(enclosure_url.to_string());
    enclosure.set_length(length.to_string());
    enclosure.set_mime_type(AUDIO_MIME_TYPE.to_string());

    let mut guid = Guid::default();
    guid.set_value(episode.item_id.clone());
    guid.set_permalink(false);

    let mut item = Item::default();
    item.set_title(Some(episode.title.clone()));
    item.set_description(episode.description.clone());
    item.set_pub_date(Some(episode.published_at.to_rfc2822()));
    item.set_guid(Some(guid));
    item.set_enclosure(Some(enclosure));
    item
}

/// Atomically write `document` to the show directory, returning its path
pub fn write_feed(show_dir: &Path, document: &FeedDocument) -> Result<PathBuf, FeedError> {
    let path = show_dir.join(FEED_FILENAME);
    write_atomically(&path, document.xml.as_bytes()).map_err(|e| FeedError::WriteFailed {
        path: path.clone(),
        source: e,
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::make_show;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn base() -> Url {
        Url::parse("https://pods.example.com/yt/").unwrap()
    }

    fn record(item_id: &str, day: u32) -> EpisodeRecord {
        let published_at: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap();
        EpisodeRecord {
            item_id: item_id.to_string(),
            published_at,
            title: format!("Episode {item_id}"),
            description: Some(format!("About {item_id}")),
            audio_filename: format!("2024-01-{day:02}-{item_id}.mp3"),
            processed_at: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            content_hash: None,
        }
    }

    fn inventory(records: &[&EpisodeRecord]) -> OutputState {
        OutputState {
            audio_files: records
                .iter()
                .map(|r| (r.audio_filename.clone(), 1000))
                .collect::<BTreeMap<_, _>>(),
            ..Default::default()
        }
    }

    fn parse(xml: &str) -> Channel {
        Channel::read_from(xml.as_bytes()).unwrap()
    }

    #[test]
    fn lists_episodes_newest_first() {
        let show = make_show("s1", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let (v1, v2, v3) = (record("v1", 1), record("v2", 2), record("v3", 3));
        let records = vec![&v2, &v1, &v3];

        let doc = build_feed(&show, &base(), &records, &inventory(&records), MissingAudioPolicy::Omit)
            .unwrap();
        let channel = parse(&doc.xml);

        let titles: Vec<_> = channel.items().iter().filter_map(|i| i.title()).collect();
        assert_eq!(titles, vec!["Episode v3", "Episode v2", "Episode v1"]);
        assert_eq!(doc.entries, 3);
    }

    #[test]
    fn entries_carry_enclosure_date_and_guid() {
        let show = make_show("s1", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let v1 = record("v1", 5);
        let records = vec![&v1];

        let doc = build_feed(&show, &base(), &records, &inventory(&records), MissingAudioPolicy::Omit)
            .unwrap();
        let channel = parse(&doc.xml);
        let item = &channel.items()[0];

        let enclosure = item.enclosure().unwrap();
        assert_eq!(
            enclosure.url(),
            "https://pods.example.com/yt/s1/2024-01-05-v1.mp3"
        );
        assert_eq!(enclosure.length(), "1000");
        assert_eq!(enclosure.mime_type(), "audio/mpeg");
        let pub_date = DateTime::parse_from_rfc2822(item.pub_date().unwrap()).unwrap();
        assert_eq!(pub_date, v1.published_at);
        assert_eq!(item.guid().unwrap().value(), "v1");
        assert!(!item.guid().unwrap().is_permalink());
        assert_eq!(item.description(), Some("About v1"));
    }

    #[test]
    fn channel_carries_show_metadata() {
        let show = make_show("s1", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        let doc = build_feed(&show, &base(), &[], &OutputState::default(), MissingAudioPolicy::Omit)
            .unwrap();
        let channel = parse(&doc.xml);

        assert_eq!(channel.title(), "Show s1");
        assert_eq!(channel.description(), "A test show");
        assert_eq!(channel.link(), "https://pods.example.com/yt/s1/feed.xml");
        assert_eq!(channel.image().unwrap().url(), "https://example.com/cover.png");
        assert_eq!(
            channel.itunes_ext().and_then(|ext| ext.image()),
            Some("https://example.com/cover.png")
        );
        assert!(channel.items().is_empty());
    }

    #[test]
    fn rendering_is_deterministic() {
        let show = make_show("s1", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let (v1, v2) = (record("v1", 1), record("v2", 2));
        let forward = vec![&v1, &v2];
        let backward = vec![&v2, &v1];

        let a = build_feed(&show, &base(), &forward, &inventory(&forward), MissingAudioPolicy::Omit)
            .unwrap();
        let b = build_feed(&show, &base(), &backward, &inventory(&backward), MissingAudioPolicy::Omit)
            .unwrap();
        assert_eq!(a.xml, b.xml);
    }

    #[test]
    fn missing_audio_is_omitted_by_default() {
        let show = make_show("s1", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let (v1, v2) = (record("v1", 1), record("v2", 2));
        let on_disk = inventory(&[&v1]);

        let doc = build_feed(&show, &base(), &[&v1, &v2], &on_disk, MissingAudioPolicy::Omit)
            .unwrap();

        assert_eq!(doc.entries, 1);
        assert_eq!(doc.missing_audio, vec!["2024-01-02-v2.mp3".to_string()]);
        assert_eq!(parse(&doc.xml).items()[0].title(), Some("Episode v1"));
    }

    #[test]
    fn missing_audio_can_be_kept_with_zero_length() {
        let show = make_show("s1", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let (v1, v2) = (record("v1", 1), record("v2", 2));
        let on_disk = inventory(&[&v1]);

        let doc = build_feed(&show, &base(), &[&v1, &v2], &on_disk, MissingAudioPolicy::Keep)
            .unwrap();
        let channel = parse(&doc.xml);

        assert_eq!(doc.entries, 2);
        assert_eq!(doc.missing_audio.len(), 1);
        assert_eq!(channel.items()[0].enclosure().unwrap().length(), "0");
    }

    #[test]
    fn missing_show_metadata_is_a_render_error() {
        let mut show = make_show("s1", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        show.description = "  ".to_string();

        let result = build_feed(&show, &base(), &[], &OutputState::default(), MissingAudioPolicy::Omit);
        assert!(matches!(
            result,
            Err(FeedError::MissingMetadata { field: "description", .. })
        ));
    }

    #[test]
    fn feed_url_is_under_show_directory() {
        assert_eq!(
            feed_url(&base(), "s1").unwrap().as_str(),
            "https://pods.example.com/yt/s1/feed.xml"
        );
    }

    #[test]
    fn write_feed_replaces_file() {
        let dir = tempdir().unwrap();
        let doc = FeedDocument {
            xml: "<rss/>".to_string(),
            entries: 0,
            missing_audio: vec![],
        };

        let path = write_feed(dir.path(), &doc).unwrap();
        assert_eq!(path, dir.path().join(FEED_FILENAME));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<rss/>");
    }
}
