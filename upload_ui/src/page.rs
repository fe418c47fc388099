use crate::client::Detections;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::fmt::Write;

pub const TITLE: &str = "Object Detector";
pub const HEADER: &str =
    "Upload an image and the model will predict the class of the main object.";
pub const FAILURE_MESSAGE: &str = "Failed to process image.";
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "png", "jpeg"];

pub struct UploadedImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl UploadedImage {
    fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }
}

pub enum Outcome {
    Detections(Detections),
    Failure(String),
}

#[derive(Default)]
pub struct PageView {
    pub image: Option<UploadedImage>,
    pub outcome: Option<Outcome>,
}

/// Uppercases the first character and lowercases the rest.
pub fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

pub fn format_probability(probability: f64) -> String {
    format!("{:.2}%", probability * 100.0)
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

pub fn render(view: &PageView) -> String {
    let accept = ACCEPTED_EXTENSIONS
        .iter()
        .map(|ext| format!(".{}", ext))
        .collect::<Vec<_>>()
        .join(",");

    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n\
         <h1>{title}</h1>\n<h2>{header}</h2>\n\
         <form action=\"/upload\" method=\"post\" enctype=\"multipart/form-data\">\n\
         <label for=\"file\">Choose an image...</label>\n\
         <input type=\"file\" id=\"file\" name=\"file\" accept=\"{accept}\" required>\n\
         <button type=\"submit\">Upload</button>\n</form>\n",
        title = TITLE,
        header = HEADER,
        accept = accept,
    );

    if let Some(image) = &view.image {
        let _ = write!(
            html,
            "<figure>\n<img src=\"{}\" alt=\"Uploaded Image.\" style=\"width:100%\">\n\
             <figcaption>Uploaded Image.</figcaption>\n</figure>\n",
            escape_html(&image.data_uri())
        );
    }

    match &view.outcome {
        Some(Outcome::Detections(detections)) => {
            html.push_str("<ul class=\"detections\">\n");
            for detection in &detections.0 {
                let _ = writeln!(
                    html,
                    "<li><strong>{}</strong>: {}</li>",
                    escape_html(&capitalize(&detection.label)),
                    format_probability(detection.probability)
                );
            }
            html.push_str("</ul>\n");
        }
        Some(Outcome::Failure(detail)) => {
            let _ = writeln!(
                html,
                "<div class=\"error\" role=\"alert\"><p>{}</p><p>{}</p></div>",
                FAILURE_MESSAGE,
                escape_html(detail)
            );
        }
        None => {}
    }

    html.push_str("</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Detection;

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("tabby"), "Tabby");
        assert_eq!(capitalize("Egyptian cat"), "Egyptian cat");
        assert_eq!(capitalize("ATM"), "Atm");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_format_probability() {
        assert_eq!(format_probability(0.874321), "87.43%");
        assert_eq!(format_probability(1.0), "100.00%");
        assert_eq!(format_probability(0.00004), "0.00%");
    }

    #[test]
    fn test_render_empty_page() {
        let html = render(&PageView::default());
        assert!(html.contains("<h1>Object Detector</h1>"));
        assert!(html.contains("accept=\".jpg,.png,.jpeg\""));
        assert!(!html.contains("<img"));
        assert!(!html.contains(FAILURE_MESSAGE));
    }

    #[test]
    fn test_render_detections() {
        let view = PageView {
            image: Some(UploadedImage {
                mime_type: "image/png".to_string(),
                data: vec![1, 2, 3],
            }),
            outcome: Some(Outcome::Detections(Detections(vec![
                Detection {
                    label: "tabby".to_string(),
                    probability: 0.61237,
                },
                Detection {
                    label: "tiger <cat>".to_string(),
                    probability: 0.2,
                },
            ]))),
        };
        let html = render(&view);
        assert!(html.contains("src=\"data:image/png;base64,AQID\""));
        assert!(html.contains("<li><strong>Tabby</strong>: 61.24%</li>"));
        assert!(html.contains("<li><strong>Tiger &lt;cat&gt;</strong>: 20.00%</li>"));
        assert!(html.find("Tabby") < html.find("Tiger"));
    }

    #[test]
    fn test_render_failure() {
        let view = PageView {
            image: None,
            outcome: Some(Outcome::Failure("The detection service could not be reached.".into())),
        };
        let html = render(&view);
        assert!(html.contains(FAILURE_MESSAGE));
        assert!(html.contains("could not be reached"));
    }
}
