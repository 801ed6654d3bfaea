//! Round-trip metadata harvesting.
//!
//! Comments come from the AST (with a contextual category derived from the
//! enclosing node); includes, other preprocessor directives, and the
//! header/footer spans come from the raw source. Include resolution is
//! best-effort filesystem probing; unresolved paths keep a tagged sentinel.

use std::path::PathBuf;
use std::sync::LazyLock;

use keyweave_dts::{DtComment, DtNode};
use keyweave_layout::{
	ConfigDirective, DependencyInfo, KeymapComment, KeymapInclude, KeymapMetadata,
};
use regex::Regex;
use tracing::debug;

static INCLUDE_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r#"^\s*#include\s+[<"]([^>"]+)[>"]"#).expect("static pattern"));
static DIRECTIVE_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^\s*#(\w+)(?:\s+(.*))?").expect("static pattern"));

/// Resolves include paths against configurable search roots.
#[derive(Debug, Clone)]
pub struct IncludeResolver {
	system_roots: Vec<PathBuf>,
	local_roots: Vec<PathBuf>,
}

impl Default for IncludeResolver {
	fn default() -> Self {
		let mut system_roots = Vec::new();
		if let Some(home) = dirs::home_dir() {
			system_roots.push(home.join("zmk/app/include"));
		}
		system_roots.push(PathBuf::from("/opt/zmk/include"));
		system_roots.push(PathBuf::from("./zmk/app/include"));
		system_roots.push(PathBuf::from("./include"));

		let local_roots =
			vec![PathBuf::from("."), PathBuf::from("./config"), PathBuf::from("..")];
		Self { system_roots, local_roots }
	}
}

impl IncludeResolver {
	pub fn new(system_roots: Vec<PathBuf>, local_roots: Vec<PathBuf>) -> Self {
		Self { system_roots, local_roots }
	}

	/// First existing candidate wins; otherwise the tagged sentinel
	/// (`[system] path` / `[local] path`) stands in.
	pub fn resolve(&self, include_path: &str, is_system: bool) -> String {
		let roots = if is_system { &self.system_roots } else { &self.local_roots };
		for root in roots {
			let candidate = root.join(include_path);
			if candidate.exists() {
				let resolved = candidate.canonicalize().unwrap_or(candidate);
				return resolved.to_string_lossy().into_owned();
			}
		}
		let tag = if is_system { "system" } else { "local" };
		format!("[{tag}] {include_path}")
	}
}

/// Harvests comments, includes, directives, header/footer spans, and the
/// include dependency graph.
#[derive(Debug, Default)]
pub struct MetadataExtractor {
	resolver: IncludeResolver,
}

impl MetadataExtractor {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_resolver(resolver: IncludeResolver) -> Self {
		Self { resolver }
	}

	/// Extract everything the typed layout would otherwise discard.
	pub fn extract(&self, roots: &[DtNode], source: &str) -> KeymapMetadata {
		let mut metadata = KeymapMetadata::default();

		for root in roots {
			collect_comments(root, "root", &mut metadata.comments);
		}

		let lines: Vec<&str> = source.lines().collect();
		self.collect_includes(&lines, &mut metadata);
		collect_directives(&lines, &mut metadata.config_directives);
		let (header, footer) = extract_header_footer(&lines);
		metadata.original_header = header;
		metadata.original_footer = footer;

		metadata.dependencies = build_dependency_info(&metadata.includes);
		metadata
	}

	fn collect_includes(&self, lines: &[&str], metadata: &mut KeymapMetadata) {
		for (index, line) in lines.iter().enumerate() {
			let Some(cap) = INCLUDE_RE.captures(line) else { continue };
			let path = cap[1].to_string();
			let is_system = line.contains('<');
			let resolved_path = self.resolver.resolve(&path, is_system);
			debug!(include = %path, resolved = %resolved_path, "include directive");
			metadata.includes.push(KeymapInclude {
				path,
				line: (index + 1) as u32,
				resolved_path,
			});
		}
	}
}

fn collect_comments(node: &DtNode, parent_context: &str, out: &mut Vec<KeymapComment>) {
	let context = comment_context(node, parent_context);
	for comment in &node.comments {
		out.push(keymap_comment(comment, &context));
	}

	for prop in node.properties.values() {
		for comment in &prop.comments {
			out.push(keymap_comment(comment, &format!("property:{}", prop.name)));
		}
	}

	for child in node.children.values() {
		let child_context = match child.name.as_str() {
			"combos" | "behaviors" | "keymap" => child.name.clone(),
			_ => "child".to_string(),
		};
		collect_comments(child, &child_context, out);
	}
}

fn comment_context(node: &DtNode, parent_context: &str) -> String {
	if node.name.is_empty() {
		return "header".to_string();
	}
	if let Some(compatible) = node.compatible()
		&& compatible.contains("zmk,behavior")
	{
		return "behavior".to_string();
	}
	match node.name.as_str() {
		"combos" | "behaviors" | "keymap" => node.name.clone(),
		_ if parent_context.is_empty() || parent_context == "root" => "general".to_string(),
		_ => parent_context.to_string(),
	}
}

fn keymap_comment(comment: &DtComment, context: &str) -> KeymapComment {
	KeymapComment {
		text: comment.text.clone(),
		line: comment.line,
		context: context.to_string(),
		is_block: comment.is_block,
	}
}

const KNOWN_DIRECTIVES: &[&str] = &[
	"define", "undef", "ifdef", "ifndef", "if", "elif", "else", "endif", "pragma", "error",
	"warning",
];

fn collect_directives(lines: &[&str], out: &mut Vec<ConfigDirective>) {
	for (index, line) in lines.iter().enumerate() {
		let Some(cap) = DIRECTIVE_RE.captures(line) else { continue };
		let directive = cap[1].to_string();
		// Everything else that looks like `#word` is a property name such as
		// `#binding-cells`, not a directive.
		if !KNOWN_DIRECTIVES.contains(&directive.as_str()) {
			continue;
		}
		let rest = cap.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default();

		let (condition, value) = match directive.as_str() {
			"define" | "undef" => match rest.split_once(char::is_whitespace) {
				Some((name, val)) => (name.to_string(), val.trim().to_string()),
				None => (rest, String::new()),
			},
			_ => (rest, String::new()),
		};

		out.push(ConfigDirective { directive, condition, value, line: (index + 1) as u32 });
	}
}

/// Header: lines before the first significant content line (one that
/// contains `{` or ends with `;` and is not comment- or preprocessor-only).
/// Footer: the symmetric span from the end.
fn extract_header_footer(lines: &[&str]) -> (String, String) {
	let significant_start = |line: &str| {
		let stripped = line.trim();
		!stripped.is_empty()
			&& !stripped.starts_with("//")
			&& !stripped.starts_with("/*")
			&& !stripped.starts_with('#')
			&& (stripped.contains('{') || stripped.ends_with(';'))
	};
	let significant_end = |line: &str| {
		let stripped = line.trim();
		!stripped.is_empty()
			&& !stripped.starts_with("//")
			&& !stripped.starts_with("*/")
			&& !stripped.starts_with('#')
			&& (stripped.contains('}') || stripped.ends_with(';'))
	};

	let first = lines.iter().position(|line| significant_start(line));
	let last = lines.iter().rposition(|line| significant_end(line));

	let header = match first {
		Some(index) if index > 0 => lines[..index].join("\n").trim().to_string(),
		_ => String::new(),
	};
	let footer = match last {
		Some(index) if index + 1 < lines.len() => {
			lines[index + 1..].join("\n").trim().to_string()
		}
		_ => String::new(),
	};
	(header, footer)
}

fn build_dependency_info(includes: &[KeymapInclude]) -> DependencyInfo {
	let mut info = DependencyInfo::default();

	for include in includes {
		let lower = include.path.to_lowercase();
		let role = if lower.contains("behaviors") {
			Some("[behaviors_dtsi]")
		} else if lower.contains("keys") {
			Some("[key_definitions]")
		} else if lower.contains("bt") {
			Some("[bluetooth]")
		} else {
			None
		};
		if let Some(role) = role {
			info.behavior_sources.insert(role.to_string(), include.path.clone());
		}

		if include.resolved_path.starts_with('[') {
			info.unresolved_includes.push(include.path.clone());
		} else {
			info.include_dependencies.push(include.resolved_path.clone());
		}
	}
	info
}
