use super::*;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use rayon::prelude::*;
use serde_json::json;
use url::Url;

use crate::schema::{Field, Kind, MultiMatch, ScalarType, Source};
use crate::value::{Diagnostic, DiagnosticKind, FieldPath, Scalar, Value};

fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{name}")).unwrap()
}

fn run(markup: &str, mapping: &Mapping) -> Extraction {
    extract_markup(markup, mapping, &ExtractOptions::default()).unwrap()
}

fn path(raw: &[&str]) -> FieldPath {
    raw.iter().fold(FieldPath::root(), |p, seg| match seg.parse::<usize>() {
        Ok(i) => p.index(i),
        Err(_) => p.field(seg),
    })
}

fn kinds(extraction: &Extraction) -> Vec<(String, DiagnosticKind)> {
    extraction
        .diagnostics
        .iter()
        .map(|d| (d.path.to_string(), d.kind.clone()))
        .collect()
}

#[test]
fn default_fills_unmatched_field() {
    let mapping = Mapping::builder("product")
        .field(Field::string("title", "h1").required())
        .field(Field::scalar("price", ".price", ScalarType::Float).default_value(0.0))
        .build()
        .unwrap();
    let out = run("<h1>Widget</h1>", &mapping);

    assert_eq!(
        out.data,
        Value::Object(vec![
            ("title".into(), Value::from("Widget")),
            ("price".into(), Value::from(0.0)),
        ])
    );
    assert_eq!(
        out.diagnostics,
        vec![Diagnostic::new(path(&["price"]), DiagnosticKind::Unmatched)]
    );
    assert!(!out.is_failed());
}

#[test]
fn required_miss_fails_only_its_list_element() {
    let mapping = Mapping::builder("items")
        .field(Field::list(
            "items",
            "li",
            Kind::object(vec![Field::string("name", ".name").required()]),
        ))
        .build()
        .unwrap();
    let out = run(
        r#"<ul><li><span class="name">A</span></li><li><span class="qty">3</span></li></ul>"#,
        &mapping,
    );

    assert_eq!(
        out.data.get("items"),
        Some(&Value::List(vec![
            Value::Object(vec![("name".into(), Value::from("A"))]),
            Value::Missing,
        ]))
    );
    assert_eq!(
        out.diagnostics,
        vec![Diagnostic::new(
            path(&["items", "1", "name"]),
            DiagnosticKind::RequiredMissing
        )]
    );
    assert!(!out.is_failed());
}

#[test]
fn coercion_failure_is_recorded() {
    let mapping = Mapping::builder("count")
        .field(Field::scalar("count", ".count", ScalarType::Integer))
        .build()
        .unwrap();
    let out = run(r#"<p class="count">twelve</p>"#, &mapping);

    assert_eq!(out.data.get("count"), Some(&Value::Missing));
    assert_eq!(
        kinds(&out),
        vec![(
            "count".to_string(),
            DiagnosticKind::CoercionFailed {
                raw: "twelve".into(),
                target: ScalarType::Integer
            }
        )]
    );
}

#[test]
fn coercion_failure_uses_default() {
    let mapping = Mapping::builder("count")
        .field(
            Field::scalar("count", ".count", ScalarType::Integer)
                .required()
                .default_value(1i64),
        )
        .build()
        .unwrap();
    let out = run(r#"<p class="count">twelve</p>"#, &mapping);

    assert_eq!(out.data.get("count"), Some(&Value::from(1i64)));
    assert_eq!(out.diagnostics.len(), 1);
    assert!(matches!(
        out.diagnostics[0].kind,
        DiagnosticKind::CoercionFailed { .. }
    ));
}

#[test]
fn required_coercion_failure_fails_record() {
    let mapping = Mapping::builder("count")
        .field(Field::scalar("count", ".count", ScalarType::Integer).required())
        .build()
        .unwrap();
    let out = run(r#"<p class="count">twelve</p>"#, &mapping);

    assert!(out.is_failed());
    let found: Vec<&str> = out
        .diagnostics
        .iter()
        .map(|d| match d.kind {
            DiagnosticKind::CoercionFailed { .. } => "coercion",
            DiagnosticKind::RequiredMissing => "required",
            _ => "other",
        })
        .collect();
    assert_eq!(found, vec!["coercion", "required"]);
}

#[test]
fn first_of_three_matches() {
    let mapping = Mapping::builder("m")
        .field(Field::string("item", "li"))
        .build()
        .unwrap();
    let out = run("<ul><li>a</li><li>b</li><li>c</li></ul>", &mapping);

    assert_eq!(out.data.get("item"), Some(&Value::from("a")));
    assert_eq!(
        kinds(&out),
        vec![("item".to_string(), DiagnosticKind::MultipleMatches { count: 3 })]
    );
}

#[test]
fn last_policy_picks_last_match() {
    let mapping = Mapping::builder("m")
        .field(Field::string("item", "li").policy(MultiMatch::Last))
        .build()
        .unwrap();
    let out = run("<ul><li>a</li><li>b</li><li>c</li></ul>", &mapping);

    assert_eq!(out.data.get("item"), Some(&Value::from("c")));
    assert_eq!(out.diagnostics.len(), 1);
}

#[test]
fn all_policy_reports_and_takes_first() {
    let mapping = Mapping::builder("m")
        .field(Field::string("item", "li").policy(MultiMatch::All))
        .field(
            Field::object("seller", ".seller", vec![Field::string("name", ".name")])
                .policy(MultiMatch::All),
        )
        .build()
        .unwrap();
    let out = run(
        r#"<ul><li>a</li><li>b</li><li>c</li></ul>
           <div class="seller"><b class="name">Ana</b></div>
           <div class="seller"><b class="name">Bruno</b></div>"#,
        &mapping,
    );

    assert_eq!(out.data.get("item"), Some(&Value::from("a")));
    assert_eq!(
        out.data.get("seller"),
        Some(&Value::Object(vec![("name".into(), Value::from("Ana"))]))
    );
    assert_eq!(
        kinds(&out),
        vec![
            ("item".to_string(), DiagnosticKind::MultipleMatches { count: 3 }),
            ("seller".to_string(), DiagnosticKind::MultipleMatches { count: 2 }),
        ]
    );
}

#[test]
fn empty_list_is_not_missing() {
    let mapping = Mapping::builder("m")
        .field(Field::list("tags", ".tag", Kind::scalar(ScalarType::String)))
        .build()
        .unwrap();
    let out = run("<p>no tags here</p>", &mapping);

    assert_eq!(out.data.get("tags"), Some(&Value::List(vec![])));
    assert!(out.is_clean());
}

#[test]
fn required_empty_list_fails_record() {
    let mapping = Mapping::builder("m")
        .field(Field::string("title", "h1"))
        .field(Field::list("tags", ".tag", Kind::scalar(ScalarType::String)).required())
        .build()
        .unwrap();
    let out = run("<h1>t</h1>", &mapping);

    assert!(out.is_failed());
    assert_eq!(
        kinds(&out),
        vec![("tags".to_string(), DiagnosticKind::RequiredMissing)]
    );
}

#[test]
fn failure_moves_up_through_required_objects_only() {
    let inner = vec![Field::string("name", ".name").required()];
    let optional = Mapping::builder("m")
        .field(Field::string("title", "h1"))
        .field(Field::object("seller", ".seller", inner.clone()))
        .build()
        .unwrap();
    let required = Mapping::builder("m")
        .field(Field::string("title", "h1"))
        .field(Field::object("seller", ".seller", inner).required())
        .build()
        .unwrap();
    let markup = r#"<h1>Widget</h1><div class="seller"><span class="city">Porto</span></div>"#;

    let out = run(markup, &optional);
    assert_eq!(
        out.data,
        Value::Object(vec![
            ("title".into(), Value::from("Widget")),
            ("seller".into(), Value::Missing),
        ])
    );
    assert_eq!(
        kinds(&out),
        vec![("seller.name".to_string(), DiagnosticKind::RequiredMissing)]
    );

    let out = run(markup, &required);
    assert!(out.is_failed());
    // Not repeated for `seller` itself.
    assert_eq!(out.diagnostics.len(), 1);
}

#[test]
fn unmatched_object_anchor() {
    let mapping = Mapping::builder("m")
        .field(Field::object("seller", ".seller", vec![Field::string("name", ".name")]))
        .build()
        .unwrap();
    let out = run("<h1>t</h1>", &mapping);

    assert_eq!(out.data.get("seller"), Some(&Value::Missing));
    assert_eq!(
        kinds(&out),
        vec![("seller".to_string(), DiagnosticKind::Unmatched)]
    );
}

#[test]
fn failed_required_object_falls_back_to_default() {
    let mapping = Mapping::builder("m")
        .field(
            Field::object("seller", ".seller", vec![Field::string("name", ".name").required()])
                .required()
                .default_value(Value::Object(vec![("name".into(), Value::from("n/a"))])),
        )
        .build()
        .unwrap();
    let out = run(r#"<div class="seller"><i>x</i></div>"#, &mapping);

    assert!(!out.is_failed());
    assert_eq!(
        out.data,
        Value::Object(vec![(
            "seller".into(),
            Value::Object(vec![("name".into(), Value::from("n/a"))])
        )])
    );
    assert_eq!(
        kinds(&out),
        vec![("seller.name".to_string(), DiagnosticKind::RequiredMissing)]
    );
}

#[test]
fn element_selectors_stay_inside_their_element() {
    let mapping = Mapping::builder("m")
        .field(Field::list(
            "items",
            "li",
            Kind::object(vec![Field::string("name", "div.outer span")]),
        ))
        .build()
        .unwrap();
    let out = run(
        r#"<div class="outer"><ul><li><span>A</span></li></ul></div>"#,
        &mapping,
    );

    assert_eq!(
        serde_json::to_value(&out.data).unwrap(),
        json!({ "items": [{ "name": null }] })
    );
    assert_eq!(
        kinds(&out),
        vec![("items[0].name".to_string(), DiagnosticKind::Unmatched)]
    );
}

#[test]
fn attributes_and_relative_urls() {
    let mapping = Mapping::builder("m")
        .base_url("https://bakashi.tv/animes/")
        .field(Field::scalar("link", "a", ScalarType::Url).from_attr("href"))
        .field(Field::string("id", "a").from_attr("data-id"))
        .field(Field::string("missing_attr", "a").from_attr("title"))
        .build()
        .unwrap();
    let out = run(r#"<a href="/episodio/1/" data-id="ep-1">Ep 1</a>"#, &mapping);

    assert_eq!(
        out.data.get("link").and_then(Value::as_scalar).map(Scalar::to_string),
        Some("https://bakashi.tv/episodio/1/".to_string())
    );
    assert_eq!(out.data.get("id"), Some(&Value::from("ep-1")));
    assert_eq!(out.data.get("missing_attr"), Some(&Value::Missing));
    assert_eq!(
        kinds(&out),
        vec![("missing_attr".to_string(), DiagnosticKind::Unmatched)]
    );
}

#[test]
fn document_url_is_the_fallback_base() {
    let markup = r#"<img src="covers/a.jpg">"#;
    let field = Field::scalar("cover", "img", ScalarType::Url).from_attr("src");
    let bare = Mapping::builder("m").field(field.clone()).build().unwrap();
    let based = Mapping::builder("m")
        .base_url("https://cdn.example/")
        .field(field)
        .build()
        .unwrap();
    let doc = Document::parse_with_url(markup, Url::parse("https://site.example/anime/").unwrap());

    let out = extract(&doc, &bare).unwrap();
    assert_eq!(
        out.data.get("cover").map(|v| v.as_scalar().unwrap().to_string()),
        Some("https://site.example/anime/covers/a.jpg".to_string())
    );

    let out = extract(&doc, &based).unwrap();
    assert_eq!(
        out.data.get("cover").map(|v| v.as_scalar().unwrap().to_string()),
        Some("https://cdn.example/covers/a.jpg".to_string())
    );

    // Without any base a relative link cannot be coerced.
    let out = extract(&Document::parse(markup), &bare).unwrap();
    assert!(matches!(
        out.diagnostics[0].kind,
        DiagnosticKind::CoercionFailed {
            target: ScalarType::Url,
            ..
        }
    ));
}

#[test]
fn raw_text_and_inner_html_sources() {
    let mapping = Mapping::builder("m")
        .field(Field::string("player", "script#player").from_source(Source::RawText))
        .field(Field::string("desc", ".desc").from_source(Source::InnerHtml))
        .field(Field::string("desc_text", ".desc"))
        .build()
        .unwrap();
    let script = "\n  var player = {\"id\": 5,  \"hls\": \"/v/5.m3u8\"};\n";
    let markup = format!(
        r#"<div class="desc"><b>Bold</b>   text</div><script id="player">{script}</script>"#
    );
    let out = run(&markup, &mapping);

    assert_eq!(out.data.get("player"), Some(&Value::from(script)));
    assert_eq!(out.data.get("desc"), Some(&Value::from("<b>Bold</b>   text")));
    assert_eq!(out.data.get("desc_text"), Some(&Value::from("Bold text")));
}

fn thread_mapping() -> Mapping {
    Mapping::builder("thread")
        .field(Field::reference("thread", "section.thread > div.comment", "comment").required())
        .definition(
            "comment",
            vec![
                Field::string("text", "p.text").required(),
                Field::string("author", ".author"),
                Field::reference("reply", "div.comment", "comment"),
            ],
        )
        .build()
        .unwrap()
}

#[test]
fn self_referencing_definition() {
    let out = run(&fixture("thread.html"), &thread_mapping());

    let comment = |text: &str, author: &str, reply: Value| {
        Value::Object(vec![
            ("text".into(), Value::from(text)),
            ("author".into(), Value::from(author)),
            ("reply".into(), reply),
        ])
    };
    let expected = comment(
        "First!",
        "ana",
        comment("Welcome back", "bruno", comment("Thanks", "ana", Value::Missing)),
    );
    assert_eq!(out.data.get("thread"), Some(&expected));
    assert_eq!(
        out.diagnostics_at("thread.reply").next().map(|d| &d.kind),
        Some(&DiagnosticKind::MultipleMatches { count: 2 })
    );
    assert_eq!(
        out.diagnostics_at("thread.reply.reply.reply")
            .next()
            .map(|d| &d.kind),
        Some(&DiagnosticKind::Unmatched)
    );
}

#[test]
fn recursion_stops_at_max_depth() {
    let options = ExtractOptions { max_depth: 2 };
    let out = extract_markup(&fixture("thread.html"), &thread_mapping(), &options).unwrap();

    let second = out.data.get("thread").and_then(|t| t.get("reply")).unwrap();
    assert_eq!(second.get("text"), Some(&Value::from("Welcome back")));
    assert_eq!(second.get("reply"), Some(&Value::Missing));
    assert_eq!(
        out.diagnostics_at("thread.reply.reply")
            .map(|d| d.kind.clone())
            .collect::<Vec<_>>(),
        vec![DiagnosticKind::DepthExceeded { limit: 2 }]
    );
    assert!(!out.is_failed());
}

#[test]
fn product_fixture() {
    let mapping = Mapping::from_file("tests/fixtures/product.toml").unwrap();
    let out = run(&fixture("product.html"), &mapping);

    assert_eq!(
        serde_json::to_value(&out.data).unwrap(),
        json!({
            "title": "Widget",
            "price": 0.0,
            "in_stock": true,
            "released": "2023-11-02",
            "tags": ["tools", "home", "garden"],
            "specs": [
                { "label": "Weight", "value": 1.25 },
                { "label": "Pieces", "value": null }
            ]
        })
    );
    assert_eq!(
        kinds(&out),
        vec![
            ("price".to_string(), DiagnosticKind::Unmatched),
            (
                "specs[1].value".to_string(),
                DiagnosticKind::CoercionFailed {
                    raw: "twelve".into(),
                    target: ScalarType::Float
                }
            ),
        ]
    );
    assert_eq!(
        out.data.get("released").and_then(Value::as_scalar),
        Some(&Scalar::Date(NaiveDate::from_ymd_opt(2023, 11, 2).unwrap()))
    );
}

#[test]
fn bakashi_latest_fixture() {
    let mapping = Mapping::from_file("tests/fixtures/bakashi_latest.json").unwrap();
    let out = run(&fixture("bakashi_index.html"), &mapping);

    assert_eq!(
        serde_json::to_value(&out.data).unwrap(),
        json!({
            "episodes": [
                {
                    "title": "Naruto Shippuden Episódio 220",
                    "link": "https://bakashi.tv/episodio/naruto-shippuden-episodio-220/",
                    "thumbnail": "https://bakashi.tv/wp-content/uploads/naruto-220.jpg"
                },
                {
                    "title": "Sousou no Frieren Episódio 12",
                    "link": "https://bakashi.tv/episodio/sousou-no-frieren-episodio-12/",
                    "thumbnail": "https://cdn.bakashi.tv/covers/frieren-12.jpg"
                },
                null
            ]
        })
    );
    assert_eq!(
        kinds(&out),
        vec![
            ("episodes[2].title".to_string(), DiagnosticKind::RequiredMissing),
            ("episodes[2].link".to_string(), DiagnosticKind::Unmatched),
        ]
    );
}

#[test]
fn bakashi_search_fixture() {
    let mapping = Mapping::from_file("tests/fixtures/bakashi_search.toml").unwrap();
    let out = run(&fixture("bakashi_search.html"), &mapping);

    let results = out.data.get("results").and_then(Value::as_list).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(
        serde_json::to_value(&results[1]).unwrap(),
        json!({
            "title": "Naruto Shippuden",
            "page": "https://bakashi.tv/animes/naruto-shippuden/",
            "thumbnail": "https://bakashi.tv/img/shippuden.jpg",
            "year": 2007,
            "synopsis": "Dois anos e meio depois. Naruto volta para casa."
        })
    );
    assert_eq!(
        results[0].get("synopsis"),
        Some(&Value::from("Naruto Uzumaki quer ser o maior ninja da Vila da Folha."))
    );
    assert!(out.is_clean(), "{:?}", out.diagnostics);
}

#[test]
fn bakashi_episodes_fixture() {
    let mapping = Mapping::from_file("tests/fixtures/bakashi_episodes.json").unwrap();
    let out = run(&fixture("bakashi_episodes.html"), &mapping);

    assert_eq!(
        serde_json::to_value(&out.data).unwrap(),
        json!({
            "episodes": [
                {
                    "title": "Episódio 1",
                    "link": "https://bakashi.tv/episodio/sousou-no-frieren-episodio-1/",
                    "thumbnail": "https://bakashi.tv/wp-content/uploads/frieren-01.jpg"
                },
                {
                    "title": "Episódio 2",
                    "link": "https://bakashi.tv/episodio/sousou-no-frieren-episodio-2/",
                    "thumbnail": "https://cdn.bakashi.tv/covers/frieren-02.jpg"
                },
                {
                    "title": "Episódio 3",
                    "link": "https://bakashi.tv/episodio/sousou-no-frieren-episodio-3/",
                    "thumbnail": null
                }
            ]
        })
    );
    // A missing thumbnail is not a failure.
    assert!(!out.is_failed());
    assert_eq!(
        kinds(&out),
        vec![("episodes[2].thumbnail".to_string(), DiagnosticKind::Unmatched)]
    );
}

#[test]
fn output_mirrors_mapping_shape() {
    let mapping = Mapping::from_file("tests/fixtures/product.toml").unwrap();
    let out = run("<html><body><p>unrelated</p></body></html>", &mapping);

    let declared: Vec<&str> = mapping.root().fields.iter().map(|f| f.name.as_str()).collect();
    // `title` is required, so the record fails on an unrelated page.
    assert!(out.is_failed());

    let relaxed = Mapping::builder("relaxed")
        .fields(mapping.root().fields.iter().cloned().map(|mut f| {
            f.required = false;
            f
        }))
        .build()
        .unwrap();
    let out = run("<html><body><p>unrelated</p></body></html>", &relaxed);
    let names: Vec<&str> = out
        .data
        .as_object()
        .unwrap()
        .iter()
        .map(|(k, _)| k.as_str())
        .collect();
    assert_eq!(names, declared);
    assert_eq!(out.data.get("tags"), Some(&Value::List(vec![])));
    assert_eq!(out.data.get("title"), Some(&Value::Missing));
}

#[test]
fn repeated_runs_are_identical() {
    let mapping = Mapping::from_file("tests/fixtures/bakashi_latest.json").unwrap();
    let markup = fixture("bakashi_index.html");
    let first = run(&markup, &mapping);
    let second = run(&markup, &mapping);

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn shared_mapping_across_threads() {
    let mapping = Mapping::from_file("tests/fixtures/product.toml").unwrap();
    let markup = fixture("product.html");
    let expected = run(&markup, &mapping);

    let outputs: Vec<Extraction> = (0..16)
        .into_par_iter()
        .map(|_| run(&markup, &mapping))
        .collect();
    assert!(outputs.iter().all(|out| *out == expected));
}
