use super::*;
use crate::playlist::{self, Playlist};
use crate::track::{Artwork, Track, TrackHandle, TrackMeta};

fn track(uri: &str, title: &str, album: &str, artist: &str, genre: &str) -> TrackHandle {
    Track::new(
        uri.to_string(),
        TrackMeta {
            title: title.to_string(),
            album: album.to_string(),
            artist: artist.to_string(),
            genre: genre.to_string(),
            album_artist: artist.to_string(),
            ..TrackMeta::default()
        },
    )
}

#[test]
fn duplicate_uri_add_is_a_merge_no_op() {
    let catalog = Catalog::new();
    let first = catalog.add(track("/a.mp3", "One", "LP", "X", "Rock"), false);
    let second = catalog.add(track("/a.mp3", "Other", "Other LP", "Y", "Pop"), false);

    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(catalog.len(), 1);
    assert_eq!(second.meta().title, "One");
    // No groups were created for the discarded duplicate.
    assert_eq!(catalog.albums().len(), 1);
    assert_eq!(catalog.artists().len(), 1);
}

#[test]
fn groups_are_created_lazily_and_never_duplicated() {
    let catalog = Catalog::new();
    catalog.add(track("/1.mp3", "a", "LP", "X", "Rock"), false);
    catalog.add(track("/2.mp3", "b", "LP", "X", "Rock"), false);
    catalog.add(track("/3.mp3", "c", "EP", "X", "Jazz"), false);

    assert_eq!(catalog.albums().len(), 2);
    assert_eq!(catalog.artists().len(), 1);
    assert_eq!(catalog.genres().len(), 2);
}

#[test]
fn same_album_name_with_different_album_artist_is_a_separate_group() {
    let catalog = Catalog::new();
    catalog.add(track("/1.mp3", "a", "Greatest Hits", "X", "Rock"), false);
    catalog.add(track("/2.mp3", "b", "Greatest Hits", "Y", "Rock"), false);

    let albums = catalog.albums();
    assert_eq!(albums.len(), 2);
    let x_members = catalog.members(&albums[0]);
    assert_eq!(x_members.len(), 1);
    assert_eq!(x_members[0].uri(), "/1.mp3");
}

#[test]
fn album_members_sort_by_track_number() {
    let catalog = Catalog::new();
    let t3 = track("/3.mp3", "Three", "LP", "X", "Rock");
    t3.update(|m| m.track_number = 3);
    let t1 = track("/1.mp3", "One", "LP", "X", "Rock");
    t1.update(|m| m.track_number = 1);
    catalog.add(t3, false);
    catalog.add(t1, false);

    let members = catalog.members(&catalog.albums()[0]);
    let titles: Vec<_> = members.iter().map(|t| t.meta().title.clone()).collect();
    assert_eq!(titles, vec!["One", "Three"]);
}

#[test]
fn artist_members_sort_by_title_case_insensitively() {
    let catalog = Catalog::new();
    catalog.add(track("/1.mp3", "banana", "A", "X", "Rock"), false);
    catalog.add(track("/2.mp3", "Apple", "B", "X", "Rock"), false);

    let members = catalog.members(&catalog.artists()[0]);
    let titles: Vec<_> = members.iter().map(|t| t.meta().title.clone()).collect();
    assert_eq!(titles, vec!["Apple", "banana"]);
}

#[test]
fn representative_images_skip_placeholders() {
    let catalog = Catalog::new();
    let with_art = track("/1.mp3", "a", "LP", "X", "Rock");
    with_art.update(|m| m.artwork = Artwork::Embedded(vec![1, 2, 3]));
    catalog.add(with_art, false);
    catalog.add(track("/2.mp3", "b", "LP", "X", "Rock"), false);
    let with_art2 = track("/3.mp3", "c", "LP", "X", "Rock");
    with_art2.update(|m| m.artwork = Artwork::Embedded(vec![9]));
    catalog.add(with_art2, false);

    let album = &catalog.albums()[0];
    let images = catalog.representative_images(album, 4);
    assert_eq!(images.len(), 2);
    assert_eq!(images[0], vec![1, 2, 3]);

    assert_eq!(catalog.representative_images(album, 1).len(), 1);
}

#[test]
fn remove_drops_track_and_pending_entry() {
    let catalog = Catalog::new();
    catalog.add(track("/1.mp3", "a", "LP", "X", "Rock"), true);
    catalog.add(track("/2.mp3", "b", "LP", "X", "Rock"), true);
    assert_eq!(catalog.pending_cache_len(), 2);

    assert!(catalog.remove("/1.mp3").is_some());
    assert!(catalog.remove("/1.mp3").is_none());
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.pending_cache_len(), 1);
    // The group stays but reports one member.
    assert_eq!(catalog.members(&catalog.albums()[0]).len(), 1);
}

#[test]
fn pending_cache_drains_once() {
    let catalog = Catalog::new();
    catalog.add(track("/cached.mp3", "a", "LP", "X", "Rock"), false);
    catalog.add(track("/new.mp3", "b", "LP", "X", "Rock"), true);

    let pending = catalog.take_pending_cache();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].uri(), "/new.mp3");
    assert!(catalog.take_pending_cache().is_empty());
}

#[test]
fn register_playlist_dedups_by_name_case_insensitively() {
    let catalog = Catalog::new();
    assert!(catalog.register_playlist(Playlist::new_handle("Road Trip")));
    assert!(!catalog.register_playlist(Playlist::new_handle("road trip")));
    assert_eq!(catalog.playlists().len(), 1);
    assert!(catalog.playlist_by_name("ROAD TRIP").is_some());
}

#[test]
fn load_playlists_reads_new_files_only() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::new();
    catalog.add(track("/a.mp3", "a", "LP", "X", "Rock"), false);
    std::fs::write(dir.path().join("mix.rpl"), "s:/a.mp3\n").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a playlist").unwrap();

    assert_eq!(catalog.load_playlists(dir.path()).unwrap(), 1);
    let mix = catalog.playlist_by_name("mix").unwrap();
    assert_eq!(playlist::read(&mix).size(), 1);

    // Second pass finds nothing new; same for a re-saved file.
    assert_eq!(catalog.load_playlists(dir.path()).unwrap(), 0);
    assert_eq!(catalog.playlists().len(), 1);
}

#[test]
fn remove_playlist_unlinks_references_and_deletes_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::new();
    catalog.add(track("/a.mp3", "a", "LP", "X", "Rock"), false);
    std::fs::write(dir.path().join("child.rpl"), "s:/a.mp3\n").unwrap();
    std::fs::write(dir.path().join("parent.rpl"), "p:child\ns:/a.mp3\n").unwrap();
    catalog.load_playlists(dir.path()).unwrap();

    let parent = catalog.playlist_by_name("parent").unwrap();
    assert_eq!(playlist::read(&parent).len(), 2);

    assert!(catalog.remove_playlist("CHILD", dir.path()).unwrap());
    assert!(catalog.playlist_by_name("child").is_none());
    assert_eq!(playlist::read(&parent).len(), 1);
    assert!(!dir.path().join("child.rpl").exists());

    assert!(!catalog.remove_playlist("child", dir.path()).unwrap());
}

#[test]
fn queue_playlists_share_catalog_handles() {
    let catalog = Catalog::new();
    let t = catalog.add(track("/a.mp3", "a", "LP", "X", "Rock"), false);
    let q = Playlist::new_handle("queue");
    playlist::write(&q).push_song(t.clone());

    t.update(|m| m.title = "Renamed".into());
    let got = playlist::read(&q).get_song(0).unwrap();
    assert_eq!(got.meta().title, "Renamed");
}
