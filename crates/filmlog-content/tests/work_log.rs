//! The work log feed end to end: corpus on disk, posts in SQLite, and a
//! live subscription feeding the aggregator.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use filmlog_content::{
    DocumentCorpus, FsCorpus, LiveCollection, NewPost, PostEdit, PostService,
    SnapshotCallback, StoreLiveCollection, WorkLog,
};
use filmlog_core::{ImagePayload, LiveEntry, PrincipalId};
use filmlog_store::{Database, FsObjectStore, PostRepo};

const TIMEOUT: Duration = Duration::from_secs(5);

struct Site {
    _dir: tempfile::TempDir,
    corpus: FsCorpus,
    posts: PostService,
    live: StoreLiveCollection,
}

fn site() -> Site {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("logs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(
        docs.join("kitchen-sink.mdx"),
        "---\ntitle: Kitchen sink film\ndate: 2020-01-01\nsummary: Oak woodgrain film over a worn sink cabinet\n---\nBefore and after.\n",
    )
    .unwrap();
    std::fs::write(
        docs.join("living-room-wall.md"),
        "---\ntitle: Living room wall\ndate: 2021-06-15\n---\nConcrete-look film on an accent wall.\n",
    )
    .unwrap();

    let extensions = vec!["mdx".to_string(), "md".to_string()];
    let corpus = FsCorpus::open(&docs, &extensions);
    let repo = PostRepo::new(Database::in_memory().unwrap());
    let objects = Arc::new(FsObjectStore::new(dir.path().join("objects"), "http://localhost/storage"));
    Site {
        corpus,
        posts: PostService::new(repo.clone(), objects),
        live: StoreLiveCollection::new(repo, Duration::from_secs(60)),
        _dir: dir,
    }
}

fn owner() -> PrincipalId {
    PrincipalId::from_raw("usr_owner")
}

fn snapshots() -> (SnapshotCallback, mpsc::UnboundedReceiver<Vec<LiveEntry>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: SnapshotCallback = Box::new(move |posts| {
        let _ = tx.send(posts);
    });
    (callback, rx)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Vec<LiveEntry>>) -> Vec<LiveEntry> {
    timeout(TIMEOUT, rx.recv())
        .await
        .expect("no snapshot")
        .expect("subscription closed")
}

#[tokio::test]
async fn feed_combines_corpus_and_live_posts() {
    let site = site();
    let mut log = WorkLog::new(site.corpus.list());
    assert!(!log.live_ready());
    assert_eq!(log.view().static_entries.len(), 2);

    let (callback, mut rx) = snapshots();
    let _sub = site.live.subscribe(&owner(), callback);
    log.replace_live(next(&mut rx).await);
    assert!(log.live_ready());
    assert!(log.view().live_entries.is_empty());

    let post = site
        .posts
        .create(
            &owner(),
            NewPost {
                title: "Bathroom door wrap".into(),
                content: "Solid white film, edges sealed".into(),
                images: vec![ImagePayload::Inline("data:image/png;base64,AAAA".into())],
            },
        )
        .await
        .unwrap();

    // Creation emits twice: the insert, then the image URLs.
    let mut latest = next(&mut rx).await;
    while latest.first().map_or(true, |p| p.image_urls.is_empty()) {
        latest = next(&mut rx).await;
    }
    log.replace_live(latest);

    let merged = log.merged();
    assert_eq!(merged.len(), 3);
    assert_eq!(merged[0].id(), post.id.as_str());
    assert_eq!(merged[1].id(), "living-room-wall");
    assert_eq!(merged[2].id(), "kitchen-sink");
    assert!(log.view().live_entries[0].image_urls[0].starts_with("http://localhost/storage/images/usr_owner/"));
}

#[tokio::test]
async fn search_spans_both_sources() {
    let site = site();
    let mut log = WorkLog::new(site.corpus.list());
    let (callback, mut rx) = snapshots();
    let _sub = site.live.subscribe(&owner(), callback);
    let _ = next(&mut rx).await;

    site.posts
        .create(
            &owner(),
            NewPost {
                title: "Oak film on the pantry shelves".into(),
                content: String::new(),
                images: Vec::new(),
            },
        )
        .await
        .unwrap();
    log.replace_live(next(&mut rx).await);

    log.set_search("  OAK ");
    let view = log.view();
    assert_eq!(view.static_entries.len(), 1);
    assert_eq!(view.static_entries[0].slug, "kitchen-sink");
    assert_eq!(view.live_entries.len(), 1);

    log.set_search("nothing matches this");
    assert!(log.view().static_entries.is_empty());
    assert!(log.view().live_entries.is_empty());
    assert_eq!(log.search(), "nothing matches this");
}

#[tokio::test]
async fn edits_and_deletes_flow_into_the_feed() {
    let site = site();
    let mut log = WorkLog::new(site.corpus.list());
    let (callback, mut rx) = snapshots();
    let _sub = site.live.subscribe(&owner(), callback);
    let _ = next(&mut rx).await;

    let post = site
        .posts
        .create(
            &owner(),
            NewPost {
                title: "Entrance shoe cabinet".into(),
                ..NewPost::default()
            },
        )
        .await
        .unwrap();
    let _ = next(&mut rx).await;

    site.posts
        .update(
            &owner(),
            &post.id,
            PostEdit {
                title: Some("Entrance shoe cabinet, finished".into()),
                content: Some("Gray stone film, two days".into()),
                images: None,
            },
        )
        .await
        .unwrap();
    log.replace_live(next(&mut rx).await);
    assert_eq!(log.view().live_entries[0].title, "Entrance shoe cabinet, finished");

    site.posts.delete(&owner(), &post.id).await.unwrap();
    log.replace_live(next(&mut rx).await);
    assert!(log.view().live_entries.is_empty());
    assert_eq!(log.view().static_entries.len(), 2);
}

#[test]
fn corpus_lookup_by_slug() {
    let site = site();
    let doc = site.corpus.get("living-room-wall").unwrap();
    assert_eq!(doc.title, "Living room wall");
    assert!(site.corpus.get("../living-room-wall").is_none());
    assert!(site.corpus.get("missing").is_none());
}
