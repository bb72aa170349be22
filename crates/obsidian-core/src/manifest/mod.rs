pub mod client;
pub mod types;

pub use client::ManifestClient;
pub use types::{
    Arg, ArgValue, ArgumentsSpec, Artifact, AssetIndexFile, AssetIndexRef, AssetObject,
    JavaVersionRef, LatestPointers, Library, LibraryDownloads, ManifestEntry, ManifestIndex,
    VersionDetail, VersionKind,
};
