// src/xmltv.rs
//! XMLTV document assembly: channel ordering, escaping, timestamp formatting and
//! the staging-file render.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::{EpgConfig, ProgrammeOrder};
use crate::model::{Channel, Programme};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S %z";
const TEXT_LANG: &str = "en";

/// Everything the renderer needs besides the records themselves.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub priority_language_id: i64,
    pub tz: FixedOffset,
    pub programme_order: ProgrammeOrder,
    pub generator_name: String,
}

impl RenderOptions {
    pub fn from_config(cfg: &EpgConfig) -> Self {
        Self {
            priority_language_id: cfg.priority_language_id,
            tz: cfg.utc_offset(),
            programme_order: cfg.programme_order,
            generator_name: cfg.generator_name.clone(),
        }
    }
}

/// Priority-language channels first, each group by ascending id.
pub fn order_channels(channels: &[Channel], priority_language_id: i64) -> Vec<&Channel> {
    let mut ordered: Vec<&Channel> = channels.iter().collect();
    ordered.sort_by_key(|c| (c.language_id != priority_language_id, c.id));
    ordered
}

fn order_programmes(programmes: &[Programme], order: ProgrammeOrder) -> Vec<&Programme> {
    let mut ordered: Vec<&Programme> = programmes.iter().collect();
    if order == ProgrammeOrder::Channel {
        ordered.sort_by_key(|p| (p.channel_id, p.start));
    }
    ordered
}

/// The XML 1.0 `Char` production.
pub fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r'
            | '\u{20}'..='\u{D7FF}'
            | '\u{E000}'..='\u{FFFD}'
            | '\u{10000}'..='\u{10FFFF}'
    )
}

/// Replace characters XML cannot carry (even escaped) with spaces.
pub fn xml_safe(s: &str) -> Cow<'_, str> {
    if s.chars().all(is_xml_char) {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(
            s.chars()
                .map(|c| if is_xml_char(c) { c } else { ' ' })
                .collect(),
        )
    }
}

/// `yyyyMMddHHmmss ±HHMM` in the given fixed zone.
pub fn format_timestamp(t: DateTime<Utc>, tz: FixedOffset) -> String {
    t.with_timezone(&tz).format(TIMESTAMP_FORMAT).to_string()
}

/// Streaming XMLTV writer. Text and attribute values are escaped on write.
pub struct XmltvWriter<W: Write> {
    writer: Writer<W>,
    tz: FixedOffset,
}

impl<W: Write> XmltvWriter<W> {
    pub fn new(inner: W, tz: FixedOffset) -> Self {
        Self {
            writer: Writer::new_with_indent(inner, b' ', 2),
            tz,
        }
    }

    /// XML declaration and the opening `<tv>`.
    pub fn begin(&mut self, generator_name: &str) -> Result<()> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let generator = xml_safe(generator_name);
        let mut tv = BytesStart::new("tv");
        tv.push_attribute(("generator-info-name", &*generator));
        self.writer.write_event(Event::Start(tv))?;
        Ok(())
    }

    pub fn write_channel(&mut self, channel: &Channel) -> Result<()> {
        let id = channel.id.to_string();
        let mut start = BytesStart::new("channel");
        start.push_attribute(("id", id.as_str()));
        self.writer.write_event(Event::Start(start))?;
        self.text_element("display-name", &channel.name, None)?;
        self.writer
            .write_event(Event::End(BytesEnd::new("channel")))?;
        Ok(())
    }

    pub fn write_programme(&mut self, p: &Programme) -> Result<()> {
        let channel = p.channel_id.to_string();
        let start_ts = format_timestamp(p.start, self.tz);
        let stop_ts = format_timestamp(p.end, self.tz);

        let mut start = BytesStart::new("programme");
        start.push_attribute(("channel", channel.as_str()));
        start.push_attribute(("start", start_ts.as_str()));
        start.push_attribute(("stop", stop_ts.as_str()));
        self.writer.write_event(Event::Start(start))?;

        self.text_element("title", &p.title, Some(TEXT_LANG))?;
        self.text_element("desc", &p.description, Some(TEXT_LANG))?;

        let poster = xml_safe(&p.poster);
        let mut icon = BytesStart::new("icon");
        icon.push_attribute(("src", &*poster));
        self.writer.write_event(Event::Empty(icon))?;

        self.writer
            .write_event(Event::End(BytesEnd::new("programme")))?;
        Ok(())
    }

    /// Closing `</tv>`; flushes and hands back the inner writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer.write_event(Event::End(BytesEnd::new("tv")))?;
        let mut inner = self.writer.into_inner();
        inner.flush().context("flushing xmltv output")?;
        Ok(inner)
    }

    fn text_element(&mut self, name: &str, text: &str, lang: Option<&str>) -> Result<()> {
        let mut start = BytesStart::new(name);
        if let Some(lang) = lang {
            start.push_attribute(("lang", lang));
        }
        self.writer.write_event(Event::Start(start))?;
        let text = xml_safe(text);
        self.writer.write_event(Event::Text(BytesText::new(&text)))?;
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }
}

/// Render the whole document into `inner`. Channels are re-ordered here;
/// programmes keep aggregate order unless `programme_order` says otherwise.
pub fn render_document<W: Write>(
    inner: W,
    channels: &[Channel],
    programmes: &[Programme],
    opts: &RenderOptions,
) -> Result<W> {
    let mut w = XmltvWriter::new(inner, opts.tz);
    w.begin(&opts.generator_name)?;
    for channel in order_channels(channels, opts.priority_language_id) {
        w.write_channel(channel)
            .with_context(|| format!("writing channel {}", channel.id))?;
    }
    for p in order_programmes(programmes, opts.programme_order) {
        w.write_programme(p)
            .with_context(|| format!("writing programme for channel {}", p.channel_id))?;
    }
    w.finish()
}

/// Render into a fresh staging file at `path`. The file is truncated first and
/// synced before returning. On error the caller must discard the file.
pub fn write_staging(
    path: &Path,
    channels: &[Channel],
    programmes: &[Programme],
    opts: &RenderOptions,
) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("creating staging file {}", path.display()))?;
    let buffered = render_document(BufWriter::new(file), channels, programmes, opts)?;
    let file = buffered
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("flushing staging file {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("syncing staging file {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        channels = channels.len(),
        programmes = programmes.len(),
        "staging document written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn opts() -> RenderOptions {
        RenderOptions {
            priority_language_id: 8,
            tz: FixedOffset::east_opt(330 * 60).unwrap(),
            programme_order: ProgrammeOrder::Arrival,
            generator_name: "test".into(),
        }
    }

    fn prog(channel_id: i64, start_secs: i64, title: &str) -> Programme {
        Programme {
            channel_id,
            start: Utc.timestamp_opt(start_secs, 0).unwrap(),
            end: Utc.timestamp_opt(start_secs + 1800, 0).unwrap(),
            title: title.into(),
            description: "d".into(),
            poster: "p.jpg".into(),
        }
    }

    fn render(channels: &[Channel], programmes: &[Programme], opts: &RenderOptions) -> String {
        let out = render_document(Vec::new(), channels, programmes, opts).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn timestamp_matches_known_value() {
        let t = Utc.timestamp_millis_opt(1_714_395_600_000).unwrap();
        assert_eq!(
            format_timestamp(t, FixedOffset::east_opt(330 * 60).unwrap()),
            "20240429183000 +0530"
        );
    }

    #[test]
    fn priority_channels_come_first_then_by_id() {
        let chans = vec![
            Channel::new(40, "d", 3),
            Channel::new(30, "c", 8),
            Channel::new(10, "a", 1),
            Channel::new(20, "b", 8),
        ];
        let ids: Vec<i64> = order_channels(&chans, 8).iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![20, 30, 10, 40]);
    }

    #[test]
    fn programmes_keep_arrival_order_by_default() {
        let ps = vec![prog(9, 100, "x"), prog(1, 50, "y"), prog(9, 10, "z")];
        let xml = render(&[], &ps, &opts());
        let x = xml.find(">x<").unwrap();
        let y = xml.find(">y<").unwrap();
        let z = xml.find(">z<").unwrap();
        assert!(x < y && y < z);
    }

    #[test]
    fn channel_order_option_groups_programmes() {
        let ps = vec![prog(9, 100, "x"), prog(1, 50, "y"), prog(9, 10, "z")];
        let mut o = opts();
        o.programme_order = ProgrammeOrder::Channel;
        let xml = render(&[], &ps, &o);
        let x = xml.find(">x<").unwrap();
        let y = xml.find(">y<").unwrap();
        let z = xml.find(">z<").unwrap();
        assert!(y < z && z < x);
    }

    #[test]
    fn special_characters_are_escaped() {
        let chans = vec![Channel::new(1, "A & B <HD>", 8)];
        let ps = vec![prog(1, 0, r#"Tom & "Jerry" <live>"#)];
        let xml = render(&chans, &ps, &opts());
        assert!(xml.contains("A &amp; B &lt;HD&gt;"));
        assert!(xml.contains("Tom &amp; &quot;Jerry&quot; &lt;live&gt;"));
        assert!(!xml.contains("<live>"));
    }

    #[test]
    fn control_characters_never_reach_the_document() {
        let chans = vec![Channel::new(1, "Bell\u{7}Channel", 8)];
        let mut p = prog(1, 0, "Form\u{C}feed");
        p.description = "Part one\u{1}part two\u{B}end\u{FFFE}".into();
        p.poster = "a\u{0}.jpg".into();
        let xml = render(&chans, &[p], &opts());

        let bad: Vec<char> = xml.chars().filter(|c| !is_xml_char(*c)).collect();
        assert!(bad.is_empty(), "illegal chars in output: {bad:?}");
        assert!(xml.contains("<desc lang=\"en\">Part one part two end </desc>"));
        assert!(xml.contains("Bell Channel"));
        assert!(xml.contains("<icon src=\"a .jpg\"/>"));
    }

    #[test]
    fn xml_safe_borrows_clean_text() {
        assert!(matches!(xml_safe("plain\ttext"), Cow::Borrowed(_)));
        assert_eq!(xml_safe("a\u{1B}b"), "a b");
    }

    #[test]
    fn document_shape() {
        let chans = vec![Channel::new(5, "Five", 8)];
        let ps = vec![prog(5, 0, "T")];
        let xml = render(&chans, &ps, &opts());
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<tv generator-info-name=\"test\">"));
        assert!(xml.contains("<channel id=\"5\">"));
        assert!(xml.contains("<display-name>Five</display-name>"));
        assert!(xml.contains(
            "<programme channel=\"5\" start=\"19700101053000 +0530\" stop=\"19700101060000 +0530\">"
        ));
        assert!(xml.contains("<title lang=\"en\">T</title>"));
        assert!(xml.contains("<desc lang=\"en\">d</desc>"));
        assert!(xml.contains("<icon src=\"p.jpg\"/>"));
        assert!(xml.trim_end().ends_with("</tv>"));
    }

    #[test]
    fn staging_file_is_truncated_on_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("epg.xml.tmp");
        std::fs::write(&path, "leftover garbage that is longer than nothing").unwrap();
        write_staging(&path, &[], &[], &opts()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("leftover"));
        assert!(content.trim_end().ends_with("</tv>"));
    }
}
