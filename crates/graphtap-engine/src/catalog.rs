//! Static catalog of the streams the tap knows how to extract.
//!
//! The catalog is the whole stream graph: three levels deep, rooted at the
//! account, with media and stories fanning out into per-entity insight
//! streams. Everything here is static data; behavior lives in the
//! strategies each definition selects.

use graphtap_types::error::ExtractError;
use graphtap_types::stream::{
    ContextField, ParamStrategy, StreamDefinition, TransformStrategy,
};
use graphtap_types::window::WindowSpec;

const USER_FIELDS: &[&str] = &[
    "id",
    "ig_id",
    "name",
    "username",
    "biography",
    "followers_count",
    "media_count",
];

const MEDIA_FIELDS: &[&str] = &[
    "id",
    "ig_id",
    "caption",
    "comments_count",
    "is_comment_enabled",
    "like_count",
    "media_product_type",
    "media_type",
    "media_url",
    "owner",
    "permalink",
    "shortcode",
    "thumbnail_url",
    "timestamp",
    "username",
    "video_title",
];

const STORY_FIELDS: &[&str] = &[
    "id",
    "ig_id",
    "caption",
    "comments_count",
    "like_count",
    "media_product_type",
    "media_type",
    "media_url",
    "owner",
    "permalink",
    "shortcode",
    "thumbnail_url",
    "timestamp",
    "username",
    "video_title",
];

// Album children expose a reduced field set; caption, like/comment counts
// and media_product_type are not available on them.
const MEDIA_CHILD_FIELDS: &[&str] = &[
    "id",
    "ig_id",
    "media_type",
    "media_url",
    "owner",
    "permalink",
    "shortcode",
    "thumbnail_url",
    "timestamp",
    "username",
];

/// Context a media-like record contributes to its insight and children
/// streams. `media_product_type` is absent on carousel children, so it maps
/// to null rather than failing.
const MEDIA_CHILD_CONTEXT: &[ContextField] = &[
    ContextField {
        context_key: "media_id",
        record_field: "id",
        required: true,
    },
    ContextField {
        context_key: "media_type",
        record_field: "media_type",
        required: true,
    },
    ContextField {
        context_key: "media_product_type",
        record_field: "media_product_type",
        required: false,
    },
];

/// Upstream serves account-level metrics roughly two years back.
const ACCOUNT_METRICS_WINDOW: WindowSpec = WindowSpec {
    max_history_days: 729,
    max_window_days: 30,
};

/// `follower_count` is only served for the trailing 30 days.
const FOLLOWERS_WINDOW: WindowSpec = WindowSpec {
    max_history_days: 30,
    max_window_days: 30,
};

const STREAMS: &[StreamDefinition] = &[
    StreamDefinition {
        name: "users",
        path: "/{user_id}",
        primary_keys: &["id"],
        replication_key: None,
        parent: None,
        state_partition_keys: None,
        params: ParamStrategy::Fields {
            fields: USER_FIELDS,
        },
        transform: TransformStrategy::Records {
            path: None,
            datetime_fields: &[],
        },
        child_context: &[ContextField {
            context_key: "user_id",
            record_field: "id",
            required: true,
        }],
    },
    StreamDefinition {
        name: "media",
        path: "/{user_id}/media",
        primary_keys: &["id"],
        replication_key: Some("timestamp"),
        parent: Some("users"),
        state_partition_keys: None,
        params: ParamStrategy::FieldsWithLookback {
            fields: MEDIA_FIELDS,
        },
        transform: TransformStrategy::Records {
            path: Some("data"),
            datetime_fields: &["timestamp"],
        },
        child_context: MEDIA_CHILD_CONTEXT,
    },
    StreamDefinition {
        name: "stories",
        path: "/{user_id}/stories",
        primary_keys: &["id"],
        replication_key: None,
        parent: Some("users"),
        state_partition_keys: None,
        params: ParamStrategy::Fields {
            fields: STORY_FIELDS,
        },
        transform: TransformStrategy::Records {
            path: Some("data"),
            datetime_fields: &["timestamp"],
        },
        child_context: MEDIA_CHILD_CONTEXT,
    },
    StreamDefinition {
        name: "media_children",
        path: "/{media_id}/children",
        primary_keys: &["id"],
        replication_key: Some("timestamp"),
        parent: Some("media"),
        state_partition_keys: Some(&["user_id"]),
        params: ParamStrategy::FieldsWithLookback {
            fields: MEDIA_CHILD_FIELDS,
        },
        transform: TransformStrategy::Records {
            path: Some("data"),
            datetime_fields: &["timestamp"],
        },
        child_context: &[],
    },
    StreamDefinition {
        name: "media_insights",
        path: "/{media_id}/insights",
        primary_keys: &["id"],
        replication_key: None,
        parent: Some("media"),
        state_partition_keys: Some(&["user_id"]),
        params: ParamStrategy::MediaMetrics,
        transform: TransformStrategy::InsightFanout,
        child_context: &[],
    },
    StreamDefinition {
        name: "story_insights",
        path: "/{media_id}/insights",
        primary_keys: &["id"],
        replication_key: None,
        parent: Some("stories"),
        state_partition_keys: Some(&["user_id"]),
        params: ParamStrategy::MediaMetrics,
        transform: TransformStrategy::InsightFanout,
        child_context: &[],
    },
    StreamDefinition {
        name: "user_insights_online_followers",
        path: "/{user_id}/insights",
        primary_keys: &["id"],
        replication_key: Some("end_time"),
        parent: Some("users"),
        state_partition_keys: None,
        params: ParamStrategy::WindowedMetrics {
            metrics: &["online_followers"],
            period: "lifetime",
            window: ACCOUNT_METRICS_WINDOW,
        },
        transform: TransformStrategy::InsightFanout,
        child_context: &[],
    },
    StreamDefinition {
        name: "user_insights_audience",
        path: "/{user_id}/insights",
        primary_keys: &["id"],
        replication_key: None,
        parent: Some("users"),
        state_partition_keys: None,
        params: ParamStrategy::LifetimeMetrics {
            metrics: &[
                "audience_city",
                "audience_country",
                "audience_gender_age",
                "audience_locale",
            ],
            period: "lifetime",
        },
        transform: TransformStrategy::InsightFanout,
        child_context: &[],
    },
    StreamDefinition {
        name: "user_insights_followers",
        path: "/{user_id}/insights",
        primary_keys: &["id"],
        replication_key: Some("end_time"),
        parent: Some("users"),
        state_partition_keys: None,
        params: ParamStrategy::WindowedMetrics {
            metrics: &["follower_count"],
            period: "day",
            window: FOLLOWERS_WINDOW,
        },
        transform: TransformStrategy::InsightFanout,
        child_context: &[],
    },
    StreamDefinition {
        name: "user_insights_daily",
        path: "/{user_id}/insights",
        primary_keys: &["id"],
        replication_key: Some("end_time"),
        parent: Some("users"),
        state_partition_keys: None,
        params: ParamStrategy::WindowedMetrics {
            metrics: &[
                "email_contacts",
                "get_directions_clicks",
                "impressions",
                "phone_call_clicks",
                "profile_views",
                "reach",
                "text_message_clicks",
                "website_clicks",
            ],
            period: "day",
            window: ACCOUNT_METRICS_WINDOW,
        },
        transform: TransformStrategy::InsightFanout,
        child_context: &[],
    },
    StreamDefinition {
        name: "user_insights_weekly",
        path: "/{user_id}/insights",
        primary_keys: &["id"],
        replication_key: Some("end_time"),
        parent: Some("users"),
        state_partition_keys: None,
        params: ParamStrategy::WindowedMetrics {
            metrics: &["impressions", "reach"],
            period: "week",
            window: ACCOUNT_METRICS_WINDOW,
        },
        transform: TransformStrategy::InsightFanout,
        child_context: &[],
    },
    StreamDefinition {
        name: "user_insights_28day",
        path: "/{user_id}/insights",
        primary_keys: &["id"],
        replication_key: Some("end_time"),
        parent: Some("users"),
        state_partition_keys: None,
        params: ParamStrategy::WindowedMetrics {
            metrics: &["impressions", "reach"],
            period: "days_28",
            window: ACCOUNT_METRICS_WINDOW,
        },
        transform: TransformStrategy::InsightFanout,
        child_context: &[],
    },
];

/// All known streams, parents before children.
#[must_use]
pub fn all_streams() -> &'static [StreamDefinition] {
    STREAMS
}

/// Look up a stream by name.
#[must_use]
pub fn stream(name: &str) -> Option<&'static StreamDefinition> {
    STREAMS.iter().find(|s| s.name == name)
}

/// Root streams of the graph.
pub fn roots() -> impl Iterator<Item = &'static StreamDefinition> {
    STREAMS.iter().filter(|s| s.parent.is_none())
}

/// Direct children of the named stream.
pub fn children_of(name: &str) -> impl Iterator<Item = &'static StreamDefinition> + '_ {
    STREAMS.iter().filter(move |s| s.parent == Some(name))
}

/// Metric set for a per-media insights request, selected by the parent
/// record's media variant.
///
/// # Errors
///
/// An unknown `media_type` is a configuration error, raised before any
/// request is made.
pub fn metrics_for_media(
    stream: &str,
    media_type: &str,
    media_product_type: Option<&str>,
) -> Result<&'static [&'static str], ExtractError> {
    match media_type {
        "IMAGE" | "VIDEO" => {
            if media_product_type == Some("STORY") {
                Ok(&[
                    "exits",
                    "impressions",
                    "reach",
                    "replies",
                    "taps_forward",
                    "taps_back",
                ])
            } else if media_type == "VIDEO" {
                Ok(&["engagement", "impressions", "reach", "saved", "video_views"])
            } else {
                Ok(&["engagement", "impressions", "reach", "saved"])
            }
        }
        "CAROUSEL_ALBUM" => Ok(&[
            "carousel_album_engagement",
            "carousel_album_impressions",
            "carousel_album_reach",
            "carousel_album_saved",
            "carousel_album_video_views",
        ]),
        other => Err(ExtractError::config(
            stream,
            format!("media_type must be one of IMAGE, VIDEO, CAROUSEL_ALBUM, got: {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_parent_reference_resolves() {
        for def in all_streams() {
            if let Some(parent) = def.parent {
                assert!(stream(parent).is_some(), "{} has unknown parent", def.name);
            }
        }
    }

    #[test]
    fn stream_names_are_unique() {
        let mut names: Vec<_> = all_streams().iter().map(|s| s.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), all_streams().len());
    }

    #[test]
    fn users_is_the_only_root() {
        let roots: Vec<_> = roots().map(|s| s.name).collect();
        assert_eq!(roots, vec!["users"]);
    }

    #[test]
    fn media_fans_out_to_children_and_insights() {
        let mut children: Vec<_> = children_of("media").map(|s| s.name).collect();
        children.sort_unstable();
        assert_eq!(children, vec!["media_children", "media_insights"]);
    }

    #[test]
    fn story_metrics_differ_from_feed_metrics() {
        let story = metrics_for_media("story_insights", "IMAGE", Some("STORY")).unwrap();
        assert!(story.contains(&"taps_forward"));
        let feed = metrics_for_media("media_insights", "IMAGE", Some("FEED")).unwrap();
        assert_eq!(feed, &["engagement", "impressions", "reach", "saved"]);
    }

    #[test]
    fn video_feed_metrics_include_video_views() {
        let metrics = metrics_for_media("media_insights", "VIDEO", None).unwrap();
        assert!(metrics.contains(&"video_views"));
    }

    #[test]
    fn carousel_metrics_are_prefixed() {
        let metrics = metrics_for_media("media_insights", "CAROUSEL_ALBUM", Some("FEED")).unwrap();
        assert!(metrics.iter().all(|m| m.starts_with("carousel_album_")));
    }

    #[test]
    fn unknown_media_type_is_config_error() {
        let err = metrics_for_media("media_insights", "REEL_UNKNOWN", None).unwrap_err();
        assert_eq!(err.category, graphtap_types::error::ErrorCategory::Config);
        assert!(!err.retryable);
    }
}
