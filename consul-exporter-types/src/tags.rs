/// Render service tags as a comma-wrapped label value.
///
/// The leading and trailing commas let consumers match a single tag with
/// `,tag,` without hitting partial tokens. No tags render as `,,`.
pub fn render_tags<S: AsRef<str>>(tags: &[S]) -> String {
    let mut out = String::from(",");
    for tag in tags {
        out.push_str(tag.as_ref());
        out.push(',');
    }
    if tags.is_empty() {
        out.push(',');
    }
    out
}
