use std::collections::HashSet;

use super::FragmentStore;
use crate::error::Result;

fn is_name_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_'
}

/// Fragment names referenced as `...name` in `text`, in order of appearance.
///
/// Duplicates are kept; `... on Type` (inline fragments) is not a reference.
pub fn references(text: &str) -> Vec<&str> {
  let mut names = Vec::new();
  let mut rest = text;

  while let Some(pos) = rest.find("...") {
    rest = &rest[pos + 3..];
    let end = rest.find(|c: char| !is_name_char(c)).unwrap_or(rest.len());
    if end > 0 {
      names.push(&rest[..end]);
    }
    rest = &rest[end..];
  }

  names
}

/// Resolve every fragment `text` depends on, directly or transitively.
///
/// Sources are returned in pre-order discovery order: a fragment comes
/// before the fragments found inside it, and siblings keep the order they
/// are referenced in. Each fragment appears once, and a fragment that was
/// already collected is never scanned again, so self-referencing and
/// mutually recursive fragments terminate.
pub fn find_dependencies<'s>(text: &str, store: &'s FragmentStore) -> Result<Vec<&'s str>> {
  let mut seen: HashSet<&str> = HashSet::new();
  let mut found = Vec::new();

  // Work-list in reverse so that popping yields references in source order.
  let mut pending: Vec<&str> = references(text).into_iter().rev().collect();

  while let Some(name) = pending.pop() {
    if seen.contains(name) {
      continue;
    }

    let source = store.resolve(name)?;
    seen.insert(name);
    found.push(source);
    pending.extend(references(source).into_iter().rev());
  }

  Ok(found)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::Error;

  fn store_with(fragments: &[(&str, &str)]) -> FragmentStore {
    let mut store = FragmentStore::new();
    for (name, text) in fragments {
      store.register(name, text).unwrap();
    }
    store
  }

  #[test]
  fn test_references() {
    assert_eq!(
      references("{ posts { ...a, ...b_2 ...a } }"),
      vec!["a", "b_2", "a"]
    );
    assert!(references("{ node { ... on Post { title } } }").is_empty());
    assert!(references("{ a }").is_empty());
  }

  #[test]
  fn test_references_stop_at_hyphen() {
    assert_eq!(references("{ ...foo-bar }"), vec!["foo"]);
  }

  #[test]
  fn test_fragments_listed_in_query() {
    let store = store_with(&[
      ("f1", "fragment f1 on Post {title}"),
      ("f2", "fragment f2 on Post {_id}"),
    ]);

    let found = find_dependencies("{ recentPosts { ...f1, ...f2 } }", &store).unwrap();
    assert_eq!(
      found,
      vec!["fragment f1 on Post {title}", "fragment f2 on Post {_id}"]
    );
  }

  #[test]
  fn test_fragments_listed_in_fragment() {
    let store = store_with(&[
      ("f1", "fragment f1 on Post {title}"),
      ("f2", "fragment f2 on Post {_id}"),
    ]);

    let found = find_dependencies("fragment kk on Post { ...f1, ...f2 }", &store).unwrap();
    assert_eq!(
      found,
      vec!["fragment f1 on Post {title}", "fragment f2 on Post {_id}"]
    );
  }

  #[test]
  fn test_nested_fragments() {
    let store = store_with(&[
      ("f1", "fragment f1 on Post {title}"),
      ("f2", "fragment f2 on Post {...f1}"),
      ("f3", "fragment f3 on Post {author}"),
    ]);

    let found = find_dependencies("{ recentPosts { ...f2 } }", &store).unwrap();
    assert_eq!(
      found,
      vec!["fragment f2 on Post {...f1}", "fragment f1 on Post {title}"]
    );
  }

  #[test]
  fn test_preorder_across_siblings() {
    let store = store_with(&[
      ("a", "fragment a on T { ...c }"),
      ("b", "fragment b on T { y }"),
      ("c", "fragment c on T { z }"),
    ]);

    let found = find_dependencies("{ ...a ...b }", &store).unwrap();
    assert_eq!(
      found,
      vec![
        "fragment a on T { ...c }",
        "fragment c on T { z }",
        "fragment b on T { y }",
      ]
    );
  }

  #[test]
  fn test_duplicates_are_merged() {
    let store = store_with(&[
      ("a", "fragment a on Post {title}"),
      ("b", "fragment b on Post { ...a }"),
    ]);

    let found = find_dependencies("{ posts { ...a, ...b, ...a } }", &store).unwrap();
    assert_eq!(
      found,
      vec!["fragment a on Post {title}", "fragment b on Post { ...a }"]
    );
  }

  #[test]
  fn test_self_reference_terminates() {
    let store = store_with(&[("tree", "fragment tree on Node { children { ...tree } }")]);

    let found = find_dependencies("{ root { ...tree } }", &store).unwrap();
    assert_eq!(found, vec!["fragment tree on Node { children { ...tree } }"]);
  }

  #[test]
  fn test_mutual_recursion_terminates() {
    let store = store_with(&[
      ("ping", "fragment ping on T { ...pong }"),
      ("pong", "fragment pong on T { ...ping }"),
    ]);

    let found = find_dependencies("{ ...ping }", &store).unwrap();
    assert_eq!(found.len(), 2);
  }

  #[test]
  fn test_unknown_fragment() {
    let store = store_with(&[("a", "fragment a on T { ...missing }")]);

    let err = find_dependencies("{ x { ...a } }", &store).unwrap_err();
    assert!(matches!(err, Error::UnknownFragment(name) if name == "missing"));
  }

  #[test]
  fn test_no_references() {
    let store = FragmentStore::new();
    assert!(find_dependencies("{a}", &store).unwrap().is_empty());
  }
}
