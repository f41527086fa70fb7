//! Id-keyed merging of optimistic entries into loaded lists.

use crate::storage::{Comment, Post};

/// Anything with a stable identifier
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Post {
    fn key(&self) -> &str {
        self.id.as_str()
    }
}

impl Keyed for Comment {
    fn key(&self) -> &str {
        self.id.as_str()
    }
}

/// Insert `item` at the front unless an entry with its id is present
///
/// Returns whether the list changed.
pub fn prepend_unique<T: Keyed>(list: &mut Vec<T>, item: T) -> bool {
    if list.iter().any(|existing| existing.key() == item.key()) {
        return false;
    }
    list.insert(0, item);
    true
}

/// Push `item` at the back unless an entry with its id is present
pub fn append_unique<T: Keyed>(list: &mut Vec<T>, item: T) -> bool {
    if list.iter().any(|existing| existing.key() == item.key()) {
        return false;
    }
    list.push(item);
    true
}

/// Remove the entry with `key`, returning it
pub fn remove_by_key<T: Keyed>(list: &mut Vec<T>, key: &str) -> Option<T> {
    let index = list.iter().position(|item| item.key() == key)?;
    Some(list.remove(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PostId;

    fn post(id: &str) -> Post {
        Post {
            id: PostId::new(id),
            author: "소영".to_string(),
            content: id.to_string(),
            created_at: 0,
            comment_count: 0,
        }
    }

    #[test]
    fn test_prepend_unique() {
        let mut posts = vec![post("a")];
        assert!(prepend_unique(&mut posts, post("b")));
        assert!(!prepend_unique(&mut posts, post("a")));
        let ids: Vec<_> = posts.iter().map(|p| p.key()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn test_append_and_remove() {
        let mut posts = vec![post("a")];
        assert!(append_unique(&mut posts, post("b")));
        assert!(!append_unique(&mut posts, post("b")));
        assert_eq!(remove_by_key(&mut posts, "a").map(|p| p.content), Some("a".into()));
        assert!(remove_by_key(&mut posts, "a").is_none());
        assert_eq!(posts.len(), 1);
    }
}
