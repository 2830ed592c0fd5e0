use std::fmt;

use chrono::{Duration, NaiveDateTime};
use glob::Pattern;

use super::time_format::{check_naive_pattern, TimeFormat};
use crate::error::{ConfigError, Result};

const MAIN_ROOT_PREFIX: &str = "@main/";

/// Directory a rendered template is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateRoot {
    /// `main_dir` joined with `sub_dir`.
    Search,
    /// `main_dir` alone.
    Main,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Domain,
    ValidTime,
    Init(String),
    ForecastHour(usize),
}

/// A model family's file naming convention.
///
/// Literal text is a glob pattern (`*` and `**/` are allowed) and the
/// placeholders below are substituted, glob-escaped, when rendering:
///
/// - `{domain}`: the domain tag, e.g. `d01`
/// - `{valid_time}`: the valid time in the family's time format
/// - `{init:<strftime>}`: the forecast cycle (`valid_time - fhr`)
/// - `{fhr:<width>}`: the forecast hour, zero padded to `width`
///
/// A leading `@main/` anchors the pattern at the main directory instead of
/// the sub directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameTemplate {
    source: String,
    root: TemplateRoot,
    segments: Vec<Segment>,
}

/// One concrete glob pattern produced from a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPattern {
    pub root: TemplateRoot,
    pub pattern: String,
    pub forecast_hour: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub domain: Option<&'a str>,
    pub valid_time: Option<&'a NaiveDateTime>,
    pub time_format: Option<&'a TimeFormat>,
    pub max_forecast_hour: u32,
}

impl FilenameTemplate {
    pub fn parse(source: &str) -> Result<Self> {
        let invalid = |reason: &str| ConfigError::InvalidTemplate {
            template: source.to_string(),
            reason: reason.to_string(),
        };

        let (root, body) = match source.strip_prefix(MAIN_ROOT_PREFIX) {
            Some(rest) => (TemplateRoot::Main, rest),
            None => (TemplateRoot::Search, source),
        };
        if body.trim().is_empty() {
            return Err(invalid("template is empty"));
        }
        if body.starts_with('/') {
            return Err(invalid("template must be relative"));
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = body.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '{' => {
                    let mut placeholder = String::new();
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        if inner == '{' {
                            return Err(invalid("nested '{'"));
                        }
                        placeholder.push(inner);
                    }
                    if !closed {
                        return Err(invalid("unclosed '{'"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    let segment =
                        parse_placeholder(&placeholder).map_err(|reason| invalid(&reason))?;
                    segments.push(segment);
                }
                '}' => return Err(invalid("unmatched '}'")),
                _ => literal.push(ch),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        let template = Self {
            source: source.to_string(),
            root,
            segments,
        };
        if template.uses_forecast_hour() != template.uses_init() {
            return Err(invalid("'{init:..}' and '{fhr:..}' must be used together"));
        }
        Pattern::new(&template.placeholder_free_pattern())
            .map_err(|err| invalid(&format!("not a valid glob pattern: {err}")))?;
        Ok(template)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> TemplateRoot {
        self.root
    }

    pub fn uses_domain(&self) -> bool {
        self.segments.iter().any(|seg| matches!(seg, Segment::Domain))
    }

    pub fn uses_valid_time(&self) -> bool {
        self.segments
            .iter()
            .any(|seg| matches!(seg, Segment::ValidTime))
    }

    pub fn uses_init(&self) -> bool {
        self.segments
            .iter()
            .any(|seg| matches!(seg, Segment::Init(_)))
    }

    pub fn uses_forecast_hour(&self) -> bool {
        self.segments
            .iter()
            .any(|seg| matches!(seg, Segment::ForecastHour(_)))
    }

    pub fn needs_time(&self) -> bool {
        self.uses_valid_time() || self.uses_init()
    }

    /// Renders every concrete pattern for `ctx`.
    ///
    /// Cycle templates produce one pattern per forecast hour in
    /// `0..=max_forecast_hour`; the rest produce exactly one.
    pub fn render(&self, ctx: &RenderContext<'_>) -> Result<Vec<RenderedPattern>> {
        if self.uses_domain() && ctx.domain.is_none() {
            return Err(ConfigError::MissingDomain {
                template: self.source.clone(),
            });
        }
        let timing = if self.needs_time() {
            match (ctx.valid_time, ctx.time_format) {
                (Some(valid_time), Some(time_format)) => Some((valid_time, time_format)),
                _ => {
                    return Err(ConfigError::InvalidTemplate {
                        template: self.source.clone(),
                        reason: "template needs a valid time but the family has no time format"
                            .to_string(),
                    })
                }
            }
        } else {
            None
        };

        let hours: Vec<Option<u32>> = if self.uses_forecast_hour() {
            (0..=ctx.max_forecast_hour).map(Some).collect()
        } else {
            vec![None]
        };

        let mut rendered = Vec::with_capacity(hours.len());
        for forecast_hour in hours {
            let init = match (timing, forecast_hour) {
                (Some((valid_time, _)), Some(hour)) => {
                    match valid_time.checked_sub_signed(Duration::hours(i64::from(hour))) {
                        Some(init) => Some(init),
                        None => continue,
                    }
                }
                _ => None,
            };

            let mut pattern = String::new();
            for segment in &self.segments {
                match segment {
                    Segment::Literal(text) => pattern.push_str(text),
                    Segment::Domain => {
                        pattern.push_str(&Pattern::escape(ctx.domain.unwrap_or_default()))
                    }
                    Segment::ValidTime => {
                        if let Some((valid_time, time_format)) = timing {
                            pattern.push_str(&Pattern::escape(&time_format.format(valid_time)));
                        }
                    }
                    Segment::Init(format) => {
                        if let Some(init) = init {
                            pattern.push_str(&Pattern::escape(&init.format(format).to_string()));
                        }
                    }
                    Segment::ForecastHour(width) => {
                        pattern.push_str(&format!(
                            "{:0width$}",
                            forecast_hour.unwrap_or_default(),
                            width = *width
                        ));
                    }
                }
            }
            rendered.push(RenderedPattern {
                root: self.root,
                pattern,
                forecast_hour,
            });
        }
        Ok(rendered)
    }

    // Placeholders replaced by a plain character so glob syntax in the
    // literals can be checked once, up front.
    fn placeholder_free_pattern(&self) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.as_str(),
                _ => "x",
            })
            .collect()
    }
}

impl fmt::Display for FilenameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_placeholder(raw: &str) -> std::result::Result<Segment, String> {
    let (name, arg) = match raw.split_once(':') {
        Some((name, arg)) => (name.trim(), Some(arg)),
        None => (raw.trim(), None),
    };
    match (name, arg) {
        ("domain", None) => Ok(Segment::Domain),
        ("valid_time", None) => Ok(Segment::ValidTime),
        ("init", Some(format)) => {
            check_naive_pattern(format)?;
            Ok(Segment::Init(format.to_string()))
        }
        ("fhr", Some(width)) => width
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|width| (1..=4).contains(width))
            .map(Segment::ForecastHour)
            .ok_or_else(|| format!("forecast hour width '{width}' must be 1-4")),
        ("init", None) => {
            Err("'{init}' needs a strftime pattern, e.g. {init:%Y%m%d%H}".to_string())
        }
        ("fhr", None) => Err("'{fhr}' needs a width, e.g. {fhr:03}".to_string()),
        ("domain" | "valid_time", Some(_)) => Err(format!("'{{{name}}}' takes no argument")),
        _ => Err(format!("unknown placeholder '{{{raw}}}'")),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::{FilenameTemplate, RenderContext, TemplateRoot};
    use crate::error::ConfigError;
    use crate::models::TimeFormat;

    fn ctx<'a>(
        domain: Option<&'a str>,
        valid_time: &'a NaiveDateTime,
        format: &'a TimeFormat,
        max_forecast_hour: u32,
    ) -> RenderContext<'a> {
        RenderContext {
            domain,
            valid_time: Some(valid_time),
            time_format: Some(format),
            max_forecast_hour,
        }
    }

    #[test]
    fn renders_wrfout_name_with_domain_and_time() -> anyhow::Result<()> {
        let format = TimeFormat::new("%Y-%m-%d_%H:%M:%S")?;
        let valid = format.parse("2021-01-01_22:00:00")?;
        let template = FilenameTemplate::parse("**/wrfout_{domain}_{valid_time}*")?;
        let rendered = template.render(&ctx(Some("d01"), &valid, &format, 0))?;
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].pattern, "**/wrfout_d01_2021-01-01_22:00:00*");
        assert_eq!(rendered[0].root, TemplateRoot::Search);
        assert_eq!(rendered[0].forecast_hour, None);
        Ok(())
    }

    #[test]
    fn cycle_template_walks_back_one_cycle_per_forecast_hour() -> anyhow::Result<()> {
        let format = TimeFormat::new("%Y%m%d%H")?;
        let valid = format.parse("2021010102")?;
        let template = FilenameTemplate::parse("{init:%Y%m%d%H}/dynf{fhr:03}*")?;
        let patterns: Vec<String> = template
            .render(&ctx(None, &valid, &format, 3))?
            .into_iter()
            .map(|rendered| rendered.pattern)
            .collect();
        assert_eq!(
            patterns,
            vec![
                "2021010102/dynf000*",
                "2021010101/dynf001*",
                "2021010100/dynf002*",
                "2020123123/dynf003*",
            ]
        );
        Ok(())
    }

    #[test]
    fn main_root_prefix_is_stripped() -> anyhow::Result<()> {
        let template = FilenameTemplate::parse("@main/geo_em.{domain}.nc")?;
        assert_eq!(template.root(), TemplateRoot::Main);
        let rendered = template.render(&RenderContext {
            domain: Some("d02"),
            valid_time: None,
            time_format: None,
            max_forecast_hour: 0,
        })?;
        assert_eq!(rendered[0].pattern, "geo_em.d02.nc");
        Ok(())
    }

    #[test]
    fn substituted_values_are_glob_escaped() -> anyhow::Result<()> {
        let template = FilenameTemplate::parse("out_{domain}.nc")?;
        let rendered = template.render(&RenderContext {
            domain: Some("d[1]*"),
            valid_time: None,
            time_format: None,
            max_forecast_hour: 0,
        })?;
        assert_eq!(rendered[0].pattern, "out_d[[]1[]][*].nc");
        Ok(())
    }

    #[test]
    fn domain_template_without_domain_fails() -> anyhow::Result<()> {
        let template = FilenameTemplate::parse("geo_em.{domain}.nc")?;
        let err = template
            .render(&RenderContext {
                domain: None,
                valid_time: None,
                time_format: None,
                max_forecast_hour: 0,
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingDomain { .. }));
        Ok(())
    }

    #[test]
    fn rejects_malformed_templates() {
        for source in [
            "",
            "/abs/{domain}",
            "wrfout_{domain",
            "wrfout_domain}",
            "wrfout_{region}",
            "dyn{fhr:03}",
            "{init:%Y}",
            "{init:%Q}/f{fhr:02}",
            "{init:%Y%z}/f{fhr:02}",
            "{init:%Y%m%d%H%Z}/atmf{fhr:03}.nc",
            "{init}/f{fhr:02}",
            "{init:%Y}/f{fhr:x}",
            "{domain:upper}",
            "bad[glob_{domain}",
        ] {
            assert!(
                matches!(
                    FilenameTemplate::parse(source),
                    Err(ConfigError::InvalidTemplate { .. })
                ),
                "{source:?} should be rejected"
            );
        }
    }
}
