//! Announcement board.

use tracing::info;

use crate::calendar::normalize_date;
use crate::error::{AppError, Result};
use crate::store::{Removed, Store};
use crate::tables::Post;

pub type PostId = u64;

#[derive(Debug, Clone)]
pub struct NewPost {
    pub category: String,
    pub title: String,
    pub content: String,
    pub author: String,
    pub date: String,
}

pub fn add_post(store: &Store, post: NewPost) -> Result<PostId> {
    let date = normalize_date(post.date.as_str())?;
    let title = post.title.trim().to_string();
    let author = post.author.trim().to_string();
    if title.is_empty() {
        return Err(AppError::invalid("post title is required"));
    }
    if author.is_empty() {
        return Err(AppError::invalid("post needs an author"));
    }
    let category = post.category.trim().to_string();
    let content = post.content;

    let id = store.insert_next::<Post, _>(|id| Post {
        id,
        category,
        title,
        content,
        author,
        date,
    })?;
    info!(id, "added post");
    Ok(id)
}

pub fn remove_post(store: &Store, id: PostId) -> Result<Removed> {
    let removed = store.remove_id::<Post>(id)?;
    if removed == Removed::Deleted {
        info!(id, "removed post");
    }
    Ok(removed)
}

/// Posts newest first, optionally limited to one category.
pub fn list(store: &Store, category: Option<&str>) -> Result<Vec<Post>> {
    let mut posts: Vec<Post> = store
        .read::<Post>()?
        .into_iter()
        .filter(|post| category.is_none_or(|wanted| post.category == wanted))
        .collect();
    posts.sort_by(|a, b| b.id.cmp(&a.id));
    Ok(posts)
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;
    use crate::config::StoreConfig;

    struct Fixture {
        _dir: TempDir,
        store: Store,
    }

    #[fixture]
    fn fx() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(StoreConfig::new(dir.path())).unwrap();
        Fixture { _dir: dir, store }
    }

    fn notice(category: &str, title: &str) -> NewPost {
        NewPost {
            category: category.to_string(),
            title: title.to_string(),
            content: "Line one\nLine two, with a comma".to_string(),
            author: "Lee".to_string(),
            date: "2024-05-01".to_string(),
        }
    }

    #[rstest]
    fn newest_post_comes_first(fx: Fixture) {
        add_post(&fx.store, notice("notice", "Holiday hours")).unwrap();
        add_post(&fx.store, notice("recipe", "New scone")).unwrap();
        add_post(&fx.store, notice("notice", "Deep clean")).unwrap();

        let titles: Vec<String> = list(&fx.store, None)
            .unwrap()
            .into_iter()
            .map(|post| post.title)
            .collect();
        assert_eq!(titles, vec!["Deep clean", "New scone", "Holiday hours"]);

        let notices = list(&fx.store, Some("notice")).unwrap();
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].id, 3);
    }

    #[rstest]
    fn multiline_content_survives_storage(fx: Fixture) {
        add_post(&fx.store, notice("notice", "Hours")).unwrap();
        let stored = list(&fx.store, None).unwrap();
        assert_eq!(stored[0].content, "Line one\nLine two, with a comma");
    }

    #[rstest]
    fn remove_post_is_idempotent(fx: Fixture) {
        let id = add_post(&fx.store, notice("notice", "Hours")).unwrap();
        assert_eq!(remove_post(&fx.store, id).unwrap(), Removed::Deleted);
        assert_eq!(remove_post(&fx.store, id).unwrap(), Removed::Missing);
        assert!(list(&fx.store, None).unwrap().is_empty());
    }

    #[rstest]
    #[case("", "Lee")]
    #[case("Hours", " ")]
    fn post_needs_title_and_author(fx: Fixture, #[case] title: &str, #[case] author: &str) {
        let mut post = notice("notice", title);
        post.author = author.to_string();
        assert!(matches!(add_post(&fx.store, post), Err(AppError::Invalid(_))));
    }
}
