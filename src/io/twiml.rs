//! TwiML rendering for IVR replies

use crate::services::replies::IvrReply;
use std::fmt::Write;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Renders [`IvrReply`] values as Twilio voice XML
#[derive(Debug, Clone)]
pub struct TwimlRenderer {
    voice: String,
    action: String,
}

impl TwimlRenderer {
    pub fn new(voice: &str, action: &str) -> Self {
        Self { voice: escape(voice), action: escape(action) }
    }

    pub fn render(&self, reply: &IvrReply) -> String {
        let mut xml = String::with_capacity(256);
        xml.push_str(XML_HEADER);
        xml.push_str("<Response>");
        match reply {
            IvrReply::Menu { prompts } => {
                let _ = write!(
                    xml,
                    r#"<Gather action="{}" method="POST" numDigits="1">"#,
                    self.action
                );
                for prompt in prompts {
                    self.say(&mut xml, prompt);
                }
                xml.push_str("</Gather>");
            }
            IvrReply::Hangup(text) => {
                self.say(&mut xml, text);
                xml.push_str("<Hangup/>");
            }
        }
        xml.push_str("</Response>");
        xml
    }

    fn say(&self, xml: &mut String, text: &str) {
        let _ = write!(xml, r#"<Say voice="{}">{}</Say>"#, self.voice, escape(text));
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_menu() {
        let renderer = TwimlRenderer::new("Polly.Joanna", "/twilio/ivr/");
        let reply = IvrReply::Menu {
            prompts: vec!["Select your vehicle.".to_string(), "For KCA123X, press 1.".to_string()],
        };
        assert_eq!(
            renderer.render(&reply),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>\
             <Gather action=\"/twilio/ivr/\" method=\"POST\" numDigits=\"1\">\
             <Say voice=\"Polly.Joanna\">Select your vehicle.</Say>\
             <Say voice=\"Polly.Joanna\">For KCA123X, press 1.</Say>\
             </Gather></Response>"
        );
    }

    #[test]
    fn test_render_hangup_escapes_text() {
        let renderer = TwimlRenderer::new("Polly.Joanna", "/twilio/ivr/");
        let xml = renderer.render(&IvrReply::Hangup("Terms & <conditions>".to_string()));
        assert!(xml.ends_with(
            "<Say voice=\"Polly.Joanna\">Terms &amp; &lt;conditions&gt;</Say><Hangup/></Response>"
        ));
    }
}
