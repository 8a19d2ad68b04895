//! Markdown helpers for description text.
//!
//! Descriptions may embed material images as `![alt](url)`; those are passed
//! to the image provider as extra references and stripped from the prompt.

use std::sync::LazyLock;

use regex::Regex;

static IMAGE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[(.*?)\]\(([^)]*)\)").expect("static regex"));
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n").expect("static regex"));

/// Image URLs referenced from markdown: `http(s)://` URLs and `/files/` paths.
pub fn extract_image_urls(text: &str) -> Vec<String> {
    IMAGE_LINK
        .captures_iter(text)
        .filter_map(|c| c.get(2))
        .map(|m| m.as_str().trim())
        .filter(|url| url.starts_with("http://") || url.starts_with("https://") || url.starts_with("/files/"))
        .map(str::to_string)
        .collect()
}

/// Replace every image link with its alt text (or nothing) and collapse blank runs.
pub fn remove_images(text: &str) -> String {
    let replaced = IMAGE_LINK.replace_all(text, |c: &regex::Captures<'_>| {
        c.get(1).map(|m| m.as_str().trim().to_string()).unwrap_or_default()
    });
    BLANK_RUNS.replace_all(&replaced, "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_only_fetchable_urls() {
        let text = "intro ![chart](https://x.test/a.png) and ![](/files/mineru/1/b.png) ![bad](ftp://nope) ![](  )";

        assert_eq!(
            extract_image_urls(text),
            vec!["https://x.test/a.png".to_string(), "/files/mineru/1/b.png".to_string()]
        );
    }

    #[test]
    fn removal_keeps_alt_text() {
        let text = "A ![revenue chart](https://x.test/a.png) B ![](https://x.test/b.png)\n\n\n\nC";

        assert_eq!(remove_images(text), "A revenue chart B \n\nC");
    }

    #[test]
    fn patterns_are_usable_from_many_threads() {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                std::thread::spawn(move || {
                    let text = format!("slide {i} ![](https://x.test/{i}.png)\n\n\n\nend");
                    (extract_image_urls(&text), remove_images(&text))
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let (urls, stripped) = handle.join().unwrap();
            assert_eq!(urls, vec![format!("https://x.test/{i}.png")]);
            assert_eq!(stripped, format!("slide {i} \n\nend"));
        }
    }
}
