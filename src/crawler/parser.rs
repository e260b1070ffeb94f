//! HTML parser for the transit catalog pages
//!
//! This module extracts:
//! - Railway line links from a prefecture page
//! - Station links from a line page
//! - City, station code, coordinates, aliases and served lines from a station page
//! - Company, line type and company code heuristics derived from a line name
//!
//! Pages without the expected structure simply yield no links; they are not parse errors.

use crate::station::{Coordinates, Station};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Maximum length (in characters) of link text accepted as a station name
const MAX_STATION_NAME_CHARS: usize = 15;

/// Link texts on line pages that point at station pages but are not station names
const NON_STATION_LABELS: [&str; 2] = ["駅情報", "時刻表"];

/// Maximum length (in characters) of link text accepted as a line name on a station page
const MAX_LINE_NAME_CHARS: usize = 30;

/// Link texts containing `線` that are site navigation rather than lines
const NON_LINE_LABELS: [&str; 4] = ["路線図", "路線情報", "線路", "新幹線情報"];

/// Tokyo's special wards, matched before any generic municipality
const TOKYO_WARDS: [&str; 23] = [
    "千代田区", "中央区", "港区", "新宿区", "文京区", "台東区", "墨田区", "江東区", "品川区",
    "目黒区", "大田区", "世田谷区", "渋谷区", "中野区", "杉並区", "豊島区", "北区", "荒川区",
    "板橋区", "練馬区", "足立区", "葛飾区", "江戸川区",
];

/// Station numbering formats, most specific first (`JY-17`, `JY17`, `G09`)
const STATION_CODE_PATTERNS: [&str; 3] =
    [r"[A-Z]{1,4}-[A-Z]?\d{2,3}", r"[A-Z]{2,3}\d{2,3}", r"[A-Z]\d{2}"];

/// A link found on a catalog page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogLink {
    /// Trimmed link text
    pub text: String,

    /// Absolute URL of the link target
    pub url: String,
}

/// A station link found on a line page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationLink {
    pub name: String,

    /// Site-specific station identifier (path segment after `/station/`)
    pub station_id: Option<String>,

    pub url: String,
}

/// Extracts railway line links from a prefecture page
///
/// # Link Rules
///
/// **Include:** `<a href>` whose href contains `/station/{prefecture_id}/` and whose text
/// contains `線` or `JR`
///
/// **Exclude:** duplicate targets (first occurrence wins)
///
/// # Arguments
///
/// * `html` - The prefecture page
/// * `base_url` - Base URL for resolving relative links
/// * `prefecture_id` - Identifier used in the line URLs
///
/// # Example
///
/// ```
/// use eki_atlas::crawler::extract_line_links;
/// use url::Url;
///
/// let html = r#"<a href="/station/13/line/1">JR山手線</a><a href="/about">About</a>"#;
/// let base = Url::parse("https://transit.yahoo.co.jp/").unwrap();
/// let lines = extract_line_links(html, &base, "13");
/// assert_eq!(lines.len(), 1);
/// assert_eq!(lines[0].text, "JR山手線");
/// ```
pub fn extract_line_links(html: &str, base_url: &Url, prefecture_id: &str) -> Vec<CatalogLink> {
    let document = Html::parse_document(html);
    let marker = format!("/station/{}/", prefecture_id);
    let mut seen = HashSet::new();

    anchors(&document)
        .filter(|(href, text)| href.contains(&marker) && (text.contains('線') || text.contains("JR")))
        .filter_map(|(href, text)| {
            let url = resolve_link(&href, base_url)?;
            seen.insert(url.clone()).then_some(CatalogLink { text, url })
        })
        .collect()
}

/// Extracts station links from a line page
///
/// # Link Rules
///
/// **Include:** `<a href>` whose href contains `/station/`, `pref=` and `company=`
///
/// **Exclude:**
/// - Empty text, or text longer than 15 characters
/// - Navigation labels (`駅情報`, `時刻表`)
/// - Repeated station names (first occurrence wins)
pub fn extract_station_links(html: &str, base_url: &Url) -> Vec<StationLink> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();

    anchors(&document)
        .filter(|(href, text)| {
            href.contains("/station/")
                && href.contains("pref=")
                && href.contains("company=")
                && !text.is_empty()
                && !NON_STATION_LABELS.contains(&text.as_str())
                && text.chars().count() <= MAX_STATION_NAME_CHARS
        })
        .filter_map(|(href, text)| {
            let url = resolve_link(&href, base_url)?;
            if !seen.insert(text.clone()) {
                return None;
            }
            Some(StationLink {
                station_id: station_id_from_href(&href),
                name: text,
                url,
            })
        })
        .collect()
}

/// Details found on a station's own page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationDetails {
    pub city: Option<String>,
    pub station_code: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub line_color: Option<String>,

    /// Disambiguated name from the page title (e.g. `青山(岩手県)`)
    pub aliases: Vec<String>,

    /// Lines linked from the page, in page order
    pub lines: Vec<String>,
}

impl StationDetails {
    /// Merges the details into `station`
    ///
    /// Fields the page did not mention keep their current value. Aliases and lines are
    /// appended after the existing ones, skipping repeats.
    pub fn apply_to(self, station: &mut Station) {
        if self.city.is_some() {
            station.city = self.city;
        }
        if self.station_code.is_some() {
            station.station_code = self.station_code;
        }
        if self.coordinates.is_some() {
            station.coordinates = self.coordinates;
        }
        if self.line_color.is_some() {
            station.line.color = self.line_color;
        }
        for alias in self.aliases {
            if alias != station.name && !station.aliases.contains(&alias) {
                station.aliases.push(alias);
            }
        }
        for line in self.lines {
            if !station.line.all_lines.contains(&line) {
                station.line.all_lines.push(line);
            }
        }
    }
}

/// Extracts details from a station page
///
/// Every field is a heuristic over the page text and links; whatever cannot be found is left
/// empty.
///
/// # Rules
///
/// - **Alias:** the name before `駅の` in `<title>`, when it carries a parenthesized qualifier
/// - **Lines:** link texts containing `線` or `Line`, under 30 characters, minus navigation
///   labels (`路線図`, `路線情報`, `線路`, `新幹線情報`)
/// - **City:** a Tokyo special ward if one is mentioned, else the first `…市`, `…町`, `…村`
///   or `…郡` (a leading prefecture name is stripped)
/// - **Station code:** `JY-17`, `JY17` or `G09` style numbering
/// - **Coordinates:** a `lat,lon` pair inside Japan's bounding box
/// - **Line color:** the first `#RRGGBB` in the page text
///
/// # Example
///
/// ```
/// use eki_atlas::crawler::extract_station_details;
///
/// let html = "<title>上野駅の駅周辺情報</title><p>東京都台東区上野7丁目</p>";
/// let details = extract_station_details(html);
/// assert_eq!(details.city.as_deref(), Some("台東区"));
/// ```
pub fn extract_station_details(html: &str) -> StationDetails {
    let document = Html::parse_document(html);
    let text = document.root_element().text().collect::<Vec<_>>().join(" ");

    StationDetails {
        city: find_city(&text),
        station_code: find_station_code(&text),
        coordinates: find_coordinates(&text),
        line_color: Regex::new(r"#[0-9A-Fa-f]{6}\b")
            .ok()
            .and_then(|pattern| pattern.find(&text))
            .map(|m| m.as_str().to_string()),
        aliases: title_alias(&document).into_iter().collect(),
        lines: served_lines(&document),
    }
}

fn title_alias(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let title = document.select(&selector).next()?.text().collect::<String>();
    let pattern = Regex::new(r"^\s*(.+?)駅の").ok()?;
    let name = pattern.captures(&title)?.get(1)?.as_str().trim().to_string();
    (name.contains('(') || name.contains('（')).then_some(name)
}

fn served_lines(document: &Html) -> Vec<String> {
    let mut seen = HashSet::new();
    anchors(document)
        .map(|(_, text)| text)
        .filter(|text| {
            (text.contains('線') || text.contains("Line"))
                && text.chars().count() < MAX_LINE_NAME_CHARS
                && !NON_LINE_LABELS.iter().any(|label| text.contains(label))
        })
        .filter(|text| seen.insert(text.clone()))
        .collect()
}

fn find_city(text: &str) -> Option<String> {
    let ward = TOKYO_WARDS
        .iter()
        .filter_map(|ward| text.find(ward).map(|position| (position, *ward)))
        .min_by_key(|(position, _)| *position);
    if let Some((_, ward)) = ward {
        return Some(ward.to_string());
    }

    let pattern = Regex::new(
        r"(?:東京都|北海道|(?:京都|大阪)府|\p{Han}{2,3}県)?(\p{Han}[\p{Han}\p{Hiragana}\p{Katakana}]{0,5}?[市町村郡])",
    )
    .ok()?;
    pattern
        .captures(text)?
        .get(1)
        .map(|m| m.as_str().to_string())
}

fn find_station_code(text: &str) -> Option<String> {
    STATION_CODE_PATTERNS.iter().find_map(|code| {
        let pattern = Regex::new(&format!(r"(?:^|[^0-9A-Za-z-])({})(?:[^0-9A-Za-z]|$)", code)).ok()?;
        pattern
            .captures(text)?
            .get(1)
            .map(|m| m.as_str().to_string())
    })
}

fn find_coordinates(text: &str) -> Option<Coordinates> {
    let pattern = Regex::new(r"(\d{2}\.\d{3,})\s*,\s*(\d{3}\.\d{3,})").ok()?;
    let found = pattern.captures_iter(text).find_map(|caps| {
        let latitude: f64 = caps.get(1)?.as_str().parse().ok()?;
        let longitude: f64 = caps.get(2)?.as_str().parse().ok()?;
        ((20.0..=46.0).contains(&latitude) && (122.0..=154.0).contains(&longitude))
            .then_some(Coordinates {
                latitude,
                longitude,
            })
    });
    found
}

/// Iterates over `(href, trimmed text)` of every anchor with an href
fn anchors(document: &Html) -> impl Iterator<Item = (String, String)> + '_ {
    // The selector literal is valid, so parsing only fails on a scraper bug
    let selector = Selector::parse("a[href]").ok();

    selector
        .into_iter()
        .flat_map(move |selector| {
            document
                .select(&selector)
                .filter_map(|element| {
                    let href = element.value().attr("href")?.trim().to_string();
                    let text = element.text().collect::<String>().trim().to_string();
                    Some((href, text))
                })
                .collect::<Vec<_>>()
        })
}

/// Resolves an href against the page URL, keeping only HTTP(S) targets
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }

    match base_url.join(href) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Some(url.to_string()),
        _ => None,
    }
}

/// Returns the path segment following `/station/`, if any
fn station_id_from_href(href: &str) -> Option<String> {
    let (_, rest) = href.split_once("/station/")?;
    let id: String = rest
        .chars()
        .take_while(|c| !matches!(c, '/' | '?' | '#'))
        .collect();
    (!id.is_empty()).then_some(id)
}

/// Railway company operating a line, guessed from the line name
pub fn company_from_line(line_name: &str) -> &'static str {
    if line_name.contains("JR") {
        "JR東日本"
    } else if line_name.contains("東京メトロ") {
        "東京メトロ"
    } else if line_name.contains("都営") {
        "都営地下鉄"
    } else if line_name.contains("小田急") {
        "小田急電鉄"
    } else if line_name.contains("京急") {
        "京浜急行電鉄"
    } else {
        "その他"
    }
}

/// Line classification (JR, Metro, Private, Other), guessed from the line name
pub fn line_type_from_line(line_name: &str) -> &'static str {
    if line_name.contains("JR") {
        "JR"
    } else if line_name.contains("メトロ") || line_name.contains("都営") {
        "Metro"
    } else if ["私鉄", "電鉄", "鉄道"].iter().any(|term| line_name.contains(term)) {
        "Private"
    } else {
        "Other"
    }
}

/// Short code for a railway company name
pub fn company_code(company: &str) -> &'static str {
    match company {
        "JR東日本" => "JR-E",
        "東京メトロ" => "TM",
        "都営地下鉄" => "TS",
        "小田急電鉄" => "OH",
        "京浜急行電鉄" => "KK",
        _ => "OTHER",
    }
}
