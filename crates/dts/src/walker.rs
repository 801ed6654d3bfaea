//! Predicate-driven traversal over one or many AST roots.

use crate::ast::{DtNode, DtProperty};

/// Walker over a single root node.
pub struct DtWalker<'a> {
	root: &'a DtNode,
}

impl<'a> DtWalker<'a> {
	pub fn new(root: &'a DtNode) -> Self {
		Self { root }
	}

	pub fn find_nodes(&self, predicate: impl Fn(&DtNode) -> bool) -> Vec<&'a DtNode> {
		self.root.walk().filter(|n| predicate(n)).collect()
	}

	pub fn find_nodes_by_name(&self, name: &str) -> Vec<&'a DtNode> {
		self.find_nodes(|n| n.name == name)
	}

	pub fn find_nodes_by_label(&self, label: &str) -> Vec<&'a DtNode> {
		self.find_nodes(|n| n.label.as_deref() == Some(label))
	}

	/// Nodes whose slash-joined path contains `pattern` as a substring.
	pub fn find_nodes_by_path_pattern(&self, pattern: &str) -> Vec<&'a DtNode> {
		let mut results = Vec::new();
		collect_by_path(self.root, String::new(), pattern, &mut results);
		results
	}

	pub fn find_nodes_by_compatible(&self, needle: &str) -> Vec<&'a DtNode> {
		self.root.find_nodes_by_compatible(needle)
	}

	pub fn find_properties(
		&self,
		predicate: impl Fn(&DtProperty) -> bool,
	) -> Vec<(&'a DtNode, &'a DtProperty)> {
		let mut results = Vec::new();
		for node in self.root.walk() {
			for prop in node.properties.values() {
				if predicate(prop) {
					results.push((node, prop));
				}
			}
		}
		results
	}

	pub fn find_properties_by_name(&self, name: &str) -> Vec<(&'a DtNode, &'a DtProperty)> {
		self.find_properties(|p| p.name == name)
	}
}

/// Walker over multiple root nodes. Results are deduplicated by node
/// identity, so a node reachable from several roots appears once.
pub struct DtMultiWalker<'a> {
	roots: &'a [DtNode],
}

impl<'a> DtMultiWalker<'a> {
	pub fn new(roots: &'a [DtNode]) -> Self {
		Self { roots }
	}

	pub fn find_nodes(&self, predicate: impl Fn(&DtNode) -> bool) -> Vec<&'a DtNode> {
		let mut results: Vec<&'a DtNode> = Vec::new();
		for root in self.roots {
			for node in root.walk() {
				if predicate(node) && !results.iter().any(|seen| std::ptr::eq(*seen, node)) {
					results.push(node);
				}
			}
		}
		results
	}

	pub fn find_nodes_by_name(&self, name: &str) -> Vec<&'a DtNode> {
		self.find_nodes(|n| n.name == name)
	}

	pub fn find_nodes_by_label(&self, label: &str) -> Vec<&'a DtNode> {
		self.find_nodes(|n| n.label.as_deref() == Some(label))
	}

	pub fn find_nodes_by_path_pattern(&self, pattern: &str) -> Vec<&'a DtNode> {
		let mut results = Vec::new();
		for root in self.roots {
			collect_by_path(root, String::new(), pattern, &mut results);
		}
		results
	}

	pub fn find_nodes_by_compatible(&self, needle: &str) -> Vec<&'a DtNode> {
		let mut results: Vec<&'a DtNode> = Vec::new();
		for root in self.roots {
			for node in root.find_nodes_by_compatible(needle) {
				if !results.iter().any(|seen| std::ptr::eq(*seen, node)) {
					results.push(node);
				}
			}
		}
		results
	}

	pub fn find_properties(
		&self,
		predicate: impl Fn(&DtProperty) -> bool,
	) -> Vec<(&'a DtNode, &'a DtProperty)> {
		let mut results = Vec::new();
		for root in self.roots {
			for node in root.walk() {
				for prop in node.properties.values() {
					if predicate(prop) {
						results.push((node, prop));
					}
				}
			}
		}
		results
	}

	pub fn find_properties_by_name(&self, name: &str) -> Vec<(&'a DtNode, &'a DtProperty)> {
		self.find_properties(|p| p.name == name)
	}

	/// Find the parent of `target` across all roots.
	pub fn parent_of(&self, target: &DtNode) -> Option<&'a DtNode> {
		self.roots.iter().find_map(|root| root.parent_of(target))
	}
}

fn collect_by_path<'a>(
	node: &'a DtNode,
	prefix: String,
	pattern: &str,
	results: &mut Vec<&'a DtNode>,
) {
	let path = if node.name.is_empty() {
		prefix.clone()
	} else {
		format!("{prefix}/{}", node.name)
	};
	let effective = if path.is_empty() { "/".to_string() } else { path.clone() };
	if effective.contains(pattern) {
		results.push(node);
	}
	for child in node.children.values() {
		collect_by_path(child, path.clone(), pattern, results);
	}
}
