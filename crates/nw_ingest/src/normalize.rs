//! Mapping from provider records to the canonical [`Article`].

use chrono::{DateTime, Utc};
use nw_core::{Article, RawArticle};
use tracing::debug;

/// Parses the provider's `YYYY-MM-DD HH:mm:ss` UTC timestamps.
///
/// The space separator becomes `T` and a `Z` suffix is appended before RFC 3339
/// parsing. Anything that does not parse yields `None`.
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let iso = format!("{}Z", trimmed.replacen(' ', "T", 1));
    DateTime::parse_from_rfc3339(&iso)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

pub fn normalize(raw: RawArticle) -> Article {
    let pub_date = raw.pub_date.as_deref().and_then(|value| {
        let parsed = parse_pub_date(value);
        if parsed.is_none() {
            debug!(article_id = ?raw.article_id, pub_date = value, "Unparseable pubDate; leaving it unset");
        }
        parsed
    });

    Article {
        article_id: raw.article_id.unwrap_or_default(),
        title: raw.title.unwrap_or_default(),
        link: raw.link,
        description: raw.description,
        content: raw.content,
        keywords: raw.keywords,
        creator: raw.creator,
        country: raw.country,
        category: raw.category,
        ai_tag: raw.ai_tag,
        ai_region: raw.ai_region,
        ai_org: raw.ai_org,
        pub_date,
        pub_date_tz: raw.pub_date_tz,
        source_id: raw.source_id,
        source_name: raw.source_name,
        source_url: raw.source_url,
        source_icon: raw.source_icon,
        source_priority: raw.source_priority,
        language: raw.language,
        sentiment: raw.sentiment,
        sentiment_stats: raw.sentiment_stats,
        duplicate: raw.duplicate.unwrap_or(false),
        datatype: raw.datatype,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_parse_valid_dates() {
        assert_eq!(
            parse_pub_date("2024-03-15 14:30:05"),
            Some(Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 5).unwrap())
        );
        assert_eq!(
            parse_pub_date("2023-12-31 23:59:59"),
            Some(Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap())
        );
        assert_eq!(
            parse_pub_date("2024-01-02T03:04:05"),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
        );
    }

    #[test]
    fn test_parse_malformed_dates() {
        for raw in [
            "",
            "   ",
            "yesterday",
            "2024-13-01 00:00:00",
            "2024-02-30 10:00:00",
            "2024-01-01 25:61:00",
            "2024/01/01 10:00:00",
            "2024-01-01",
            "2024-01-01 10:00:00Z",
        ] {
            assert_eq!(parse_pub_date(raw), None, "{raw:?} should not parse");
        }
    }

    #[test]
    fn test_normalize_defaults_absent_fields() {
        let raw: RawArticle = serde_json::from_value(json!({
            "article_id": "abc123",
            "title": "Markets rally",
            "pubDate": "not a date",
        }))
        .unwrap();

        let article = normalize(raw);
        assert_eq!(article.article_id, "abc123");
        assert_eq!(article.title, "Markets rally");
        assert!(article.pub_date.is_none());
        assert!(article.keywords.is_empty());
        assert!(article.ai_org.is_empty());
        assert!(article.link.is_none());
        assert!(article.sentiment_stats.is_none());
        assert!(!article.duplicate);
    }

    #[test]
    fn test_normalize_full_record() {
        let raw: RawArticle = serde_json::from_value(json!({
            "article_id": "f00",
            "title": "Chip exports",
            "link": "https://example.com/chips",
            "keywords": ["chips", "trade"],
            "creator": ["Reporter One"],
            "description": "Exports climbed.",
            "content": "Full text",
            "pubDate": "2024-06-01 09:15:00",
            "pubDateTZ": "UTC",
            "source_id": "example",
            "source_name": "Example News",
            "source_url": "https://example.com",
            "source_icon": "https://example.com/icon.png",
            "source_priority": 4521,
            "language": "english",
            "country": ["united states of america"],
            "category": ["business", "technology"],
            "ai_tag": ["trade"],
            "sentiment": "positive",
            "sentiment_stats": { "positive": 80.1, "neutral": 15.2, "negative": 4.7 },
            "duplicate": true,
            "datatype": "news"
        }))
        .unwrap();

        let article = normalize(raw);
        assert_eq!(article.pub_date, Some(Utc.with_ymd_and_hms(2024, 6, 1, 9, 15, 0).unwrap()));
        assert_eq!(article.pub_date_tz.as_deref(), Some("UTC"));
        assert_eq!(article.category, vec!["business", "technology"]);
        assert_eq!(article.source_priority, Some(4521));
        assert_eq!(article.sentiment_stats.as_ref().unwrap()["neutral"], json!(15.2));
        assert!(article.duplicate);
        assert_eq!(article.datatype.as_deref(), Some("news"));
    }
}
