mod download;
mod filename;
mod transcode;

pub use download::{DownloadContext, DownloadResult, download_stream};
pub use filename::generate_filename;
pub use transcode::{TranscodeOptions, transcode_to_mp3};
