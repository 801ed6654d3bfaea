//! Binding grouping over Devicetree arrays.
//!
//! In an angle-bracket array, a reference followed by non-reference items
//! forms one logical binding whose parameters run up to the next reference:
//! `<&kp Q &hm LCTRL A>` is the two bindings `&kp Q` and `&hm LCTRL A`.

use keyweave_dts::DtArrayElem;
use keyweave_layout::LayoutBinding;

/// Group array elements into logical bindings.
///
/// Standalone parameters with no preceding behavior reference are skipped
/// and reported through `warnings`.
pub fn group_bindings(elems: &[DtArrayElem], warnings: &mut Vec<String>) -> Vec<LayoutBinding> {
	let texts: Vec<String> = elems.iter().map(DtArrayElem::as_text).collect();
	let mut bindings = Vec::new();
	let mut i = 0;

	while i < texts.len() {
		if texts[i].starts_with('&') {
			let mut parts = vec![texts[i].clone()];
			i += 1;
			while i < texts.len() && !texts[i].starts_with('&') {
				parts.push(texts[i].clone());
				i += 1;
			}
			bindings.push(LayoutBinding::parse_lenient(&parts.join(" ")));
		} else {
			warnings.push(format!(
				"standalone parameter '{}' without behavior reference",
				texts[i]
			));
			i += 1;
		}
	}
	bindings
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn tokens(items: &[&str]) -> Vec<DtArrayElem> {
		items.iter().map(|t| DtArrayElem::Token((*t).to_string())).collect()
	}

	#[test]
	fn test_grouping_rule() {
		let mut warnings = Vec::new();
		let bindings = group_bindings(&tokens(&["&kp", "Q", "&hm", "LCTRL", "A"]), &mut warnings);
		assert!(warnings.is_empty());

		let shapes: Vec<(String, Vec<String>)> = bindings
			.iter()
			.map(|b| (b.value.clone(), b.params.iter().map(|p| p.value.to_string()).collect()))
			.collect();
		assert_eq!(
			shapes,
			vec![
				("&kp".to_string(), vec!["Q".to_string()]),
				("&hm".to_string(), vec!["LCTRL".to_string(), "A".to_string()]),
			]
		);
	}

	#[test]
	fn test_nested_call_groups_with_reference() {
		let mut warnings = Vec::new();
		let bindings = group_bindings(&tokens(&["&sk", "LA(LC(LSHFT))"]), &mut warnings);
		assert_eq!(bindings.len(), 1);
		assert_eq!(bindings[0].value, "&sk");
		assert_eq!(bindings[0].params.len(), 1);
		assert_eq!(bindings[0].params[0].params.len(), 1);
	}

	#[test]
	fn test_standalone_parameter_warns() {
		let mut warnings = Vec::new();
		let bindings = group_bindings(&tokens(&["Q", "&kp", "W"]), &mut warnings);
		assert_eq!(bindings.len(), 1);
		assert_eq!(warnings.len(), 1);
		assert!(warnings[0].contains("standalone parameter 'Q'"));
	}

	#[test]
	fn test_integer_elements_become_params() {
		let mut warnings = Vec::new();
		let elems =
			vec![DtArrayElem::Token("&lt".into()), DtArrayElem::Int(2), DtArrayElem::Token("SPACE".into())];
		let bindings = group_bindings(&elems, &mut warnings);
		assert_eq!(bindings.len(), 1);
		assert_eq!(bindings[0].to_string(), "&lt 2 SPACE");
	}
}
