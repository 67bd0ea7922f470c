use ab_core::traits::MarkupRenderer;
use ab_markup::RestrictedMarkdown;

fn render(source: &str) -> String {
    RestrictedMarkdown::new().render(source)
}

#[test]
fn strike_and_image_with_script_escaped() {
    let out = render("~struck~ and ![alt](http://x/y.png) <script>alert(1)</script>");
    assert_eq!(
        out,
        "<p><del>struck</del> and <img alt=\"alt\" src=\"http://x/y.png\" /> \
         &lt;script&gt;alert(1)&lt;/script&gt;</p>"
    );
    assert!(!out.contains("<script"));
}

#[test]
fn raw_html_never_survives() {
    for hostile in [
        "<img src=x onerror=alert(1)>",
        "<a href=\"javascript:alert(1)\">x</a>",
        "[click](javascript:alert(1))",
        "![x](javascript:alert(1))",
        "<<script>script>",
        "`</code><script>`",
    ] {
        let out = render(hostile);
        assert!(!out.contains("<script"), "{hostile} -> {out}");
        assert!(!out.contains("<img src"), "{hostile} -> {out}");
        assert!(!out.contains("javascript:alert(1)\""), "{hostile} -> {out}");
    }
}

#[test]
fn attribute_breakout_is_impossible() {
    let out = render("![a\" onload=\"x](http://x/\"onerror=\"y.png)");
    assert!(!out.contains("onload=\""));
    assert!(!out.contains("\"onerror"));
}

#[test]
fn image_reference_with_definition() {
    let out = render("Look: ![Cat][c]\n\n[c]: https://img.example/cat.jpg");
    assert_eq!(
        out,
        "<p>Look: <img alt=\"Cat\" src=\"https://img.example/cat.jpg\" /></p>"
    );
}

#[test]
fn precedence_keeps_image_urls_intact() {
    let out = render("~a ![i](http://x/~b~.png) c~");
    assert_eq!(
        out,
        "<p><del>a <img alt=\"i\" src=\"http://x/~b~.png\" /> c</del></p>"
    );
}

#[test]
fn renderer_is_referentially_transparent() {
    let source = "# Hi\n\n- *a*\n- `b`\n\n1. [c](/c)";
    let renderer: &dyn MarkupRenderer = &RestrictedMarkdown;
    assert_eq!(renderer.render(source), renderer.render(source));
    assert_eq!(
        renderer.render(source),
        "<h1>Hi</h1>\n<ul>\n<li><em>a</em></li>\n<li><code>b</code></li>\n</ul>\n\
         <ol>\n<li><a href=\"/c\">c</a></li>\n</ol>"
    );
}
