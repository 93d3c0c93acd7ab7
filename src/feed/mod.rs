mod build;

pub use build::{FEED_FILENAME, FeedDocument, build_feed, feed_url, write_feed};
