//! Parsing for the deprecated but still-relevant `CNI_ARGS` environment variable.
//!
//! The grammar is `(KEY=VALUE)(;KEY=VALUE)*`, with `KEY` and `VALUE` each
//! matching `[A-Za-z0-9/._- ]+`. Fragments that don't match are silently
//! skipped; duplicate keys use last-write-wins.

use std::collections::HashMap;

use regex::Regex;

/// Recognized key that selects the Kubernetes-aware variants in §4.5/§4.6.
pub const K8S_POD_NAME: &str = "K8S_POD_NAME";

/// Parse a raw `CNI_ARGS` string into a key/value map.
///
/// An empty string parses to an empty map. Garbled fragments (those that
/// don't match the grammar) are dropped rather than causing a parse error,
/// matching this plugin's historical tolerance for the deprecated field.
pub fn parse(raw: &str) -> HashMap<String, String> {
	// UNWRAP: this pattern is a compile-time constant and known to be valid.
	let re = Regex::new(r"([A-Za-z0-9/.\-_ ]+)=([A-Za-z0-9/.\-_ ]+)(?:;|$)").unwrap();

	let mut map = HashMap::new();
	for caps in re.captures_iter(raw) {
		let key = caps[1].to_string();
		let value = caps[2].to_string();
		map.insert(key, value); // last-write-wins
	}
	map
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_string_is_empty_map() {
		assert!(parse("").is_empty());
	}

	#[test]
	fn single_pair() {
		let map = parse("K8S_POD_NAME=foo");
		assert_eq!(map.get(K8S_POD_NAME), Some(&"foo".to_string()));
	}

	#[test]
	fn multiple_pairs() {
		let map = parse("IgnoreUnknown=1;K8S_POD_NAME=foo;K8S_POD_NAMESPACE=bar");
		assert_eq!(map.len(), 3);
		assert_eq!(map.get(K8S_POD_NAME), Some(&"foo".to_string()));
		assert_eq!(map.get("K8S_POD_NAMESPACE"), Some(&"bar".to_string()));
	}

	#[test]
	fn duplicate_keys_last_write_wins() {
		let map = parse("A=first;A=second");
		assert_eq!(map.len(), 1);
		assert_eq!(map.get("A"), Some(&"second".to_string()));
	}

	#[test]
	fn garbled_fragment_is_skipped() {
		let map = parse("A=1;===;B=2");
		assert_eq!(map.len(), 2);
		assert_eq!(map.get("A"), Some(&"1".to_string()));
		assert_eq!(map.get("B"), Some(&"2".to_string()));
	}

	#[test]
	fn trailing_fragment_without_semicolon() {
		let map = parse("A=1;B=2");
		assert_eq!(map.get("B"), Some(&"2".to_string()));
	}
}
