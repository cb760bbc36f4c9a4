//! Integration tests for fatura-calendar

use chrono::{Duration, NaiveDate, Utc};
use fatura_calendar::auth::StoredToken;
use fatura_calendar::calendar::CalendarClient;
use fatura_calendar::extractor::page_lines_mem;
use fatura_calendar::vendors::{extract_edp, extract_epal, extract_gold, extract_lines};
use fatura_calendar::{
    collect_events, page_lines, run, scan_directory, Config, FaturaError, PageSelector,
    ReminderEvent, Vendor,
};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;

fn lines(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Encode text for a WinAnsiEncoding font (Latin-1 compatible characters only)
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(|c| u8::try_from(u32::from(c)).unwrap()).collect()
}

/// Write a PDF whose pages show the given lines top to bottom
fn write_pdf(path: &Path, pages: &[&[&str]]) {
    let pages = pages
        .iter()
        .map(|page| {
            let mut operations = vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new("TL", vec![14.into()]),
                Operation::new("Td", vec![50.into(), 780.into()]),
            ];
            for line in page.iter() {
                operations.push(Operation::new(
                    "Tj",
                    vec![Object::String(win_ansi(line), StringFormat::Literal)],
                ));
                operations.push(Operation::new("T*", vec![]));
            }
            operations.push(Operation::new("ET", vec![]));
            operations
        })
        .collect();
    write_content_pages(path, pages);
}

/// Write a one-page PDF showing each text at its own (x, y) position
fn write_placed_pdf(path: &Path, placed: &[(i64, i64, &str)]) {
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 10.into()]),
    ];
    for (x, y, text) in placed {
        operations.push(Operation::new(
            "Tm",
            vec![1.into(), 0.into(), 0.into(), 1.into(), (*x).into(), (*y).into()],
        ));
        operations.push(Operation::new(
            "Tj",
            vec![Object::String(win_ansi(text), StringFormat::Literal)],
        ));
    }
    operations.push(Operation::new("ET", vec![]));
    write_content_pages(path, vec![operations]);
}

/// Write a PDF with one page per operation list, all using Helvetica as `F1`
fn write_content_pages(path: &Path, pages: Vec<Vec<Operation>>) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

const GOLD_PAGE: &[&str] = &[
    "Goldenergy - Comercializadora de Energia, S.A.",
    "Fatura FT 2020/004512",
    "Pagamento por Multibanco",
    "123 456 789",
    "REFERÊNCIA",
    "21 098",
    "ENTIDADE",
    "35,40 EUR",
    "MONTANTE",
    "Próxima leitura: 12/02/2020",
    "15/01/2020",
    "Página 1 de 2",
];

const EPAL_PAGE: &[&str] = &[
    "EPAL - Empresa Portuguesa das Águas Livres",
    "PARA PAGAMENTO EM AGENTES",
    "20 081",
    "555 111 222",
    "18,92 EUR",
    "DATA LIMITE DE PAGAMENTO",
    "2020/02/10",
];

const EDP_SUMMARY_PAGE: &[&str] = &["EDP Comercial", "Resumo da fatura", "Total a pagar 61,33 EUR"];

const EDP_PAYMENT_PAGE: &[&str] = &[
    "Pagamento",
    "Data limite de pagamento:",
    "10 559",
    "987 654 321",
    "61,33 EUR",
    "28.01.2020",
    "Proxima leitura entre",
    "20-02-2020 e 24-02-2020",
];

// ============================================================================
// Gold Extraction Tests
// ============================================================================

#[test]
fn test_extract_gold_fields() {
    let invoice = extract_gold(&lines(GOLD_PAGE)).unwrap();
    assert_eq!(invoice.reference, "123 456 789");
    assert_eq!(invoice.entity, "21 098");
    assert_eq!(invoice.amount, "35,40 EUR");
    assert_eq!(invoice.due_date, date(2020, 1, 15));
    assert_eq!(invoice.next_reading_date, Some(date(2020, 2, 12)));
}

#[test]
fn test_extract_gold_labels_searched_after_reference() {
    // An earlier ENTIDADE heading must not be picked up
    let mut page = vec!["ENTIDADE", "cabeçalho"];
    page.extend_from_slice(GOLD_PAGE);
    let invoice = extract_gold(&lines(&page)).unwrap();
    assert_eq!(invoice.entity, "21 098");
}

#[test]
fn test_extract_gold_missing_reference() {
    let page: Vec<&str> = GOLD_PAGE.iter().copied().filter(|l| *l != "REFERÊNCIA").collect();
    let err = extract_gold(&lines(&page)).unwrap_err();
    assert!(matches!(err, FaturaError::Layout { vendor: Vendor::Gold, .. }));
    assert!(err.to_string().contains("REFERÊNCIA"));
}

#[test]
fn test_extract_gold_bad_due_date() {
    let mut page = GOLD_PAGE.to_vec();
    let n = page.len();
    page[n - 2] = "quinze de janeiro";
    assert!(matches!(
        extract_gold(&lines(&page)),
        Err(FaturaError::Layout { vendor: Vendor::Gold, .. })
    ));
}

#[test]
fn test_extract_gold_from_side_by_side_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gold_janeiro.pdf");
    write_placed_pdf(
        &path,
        &[
            (50, 780, "Goldenergy - Comercializadora de Energia, S.A."),
            (50, 760, "Pagamento por Multibanco"),
            (50, 740, "123 456 789"),
            (250, 740, "21 098"),
            (450, 740, "35,40 EUR"),
            (50, 726, "REFERÊNCIA"),
            (250, 726, "ENTIDADE"),
            (450, 726, "MONTANTE"),
            (50, 700, "15/01/2020"),
            (50, 686, "Página 1 de 2"),
        ],
    );

    let page = page_lines(&path, PageSelector::First).unwrap();
    assert_eq!(
        page,
        lines(&[
            "Goldenergy - Comercializadora de Energia, S.A.",
            "Pagamento por Multibanco",
            "123 456 789",
            "REFERÊNCIA",
            "21 098",
            "ENTIDADE",
            "35,40 EUR",
            "MONTANTE",
            "15/01/2020",
            "Página 1 de 2",
        ])
    );

    let invoice = extract_gold(&page).unwrap();
    assert_eq!(invoice.reference, "123 456 789");
    assert_eq!(invoice.entity, "21 098");
    assert_eq!(invoice.amount, "35,40 EUR");
    assert_eq!(invoice.due_date, date(2020, 1, 15));
}

#[test]
fn test_page_lines_keeps_columns_apart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gold.pdf");
    write_placed_pdf(
        &path,
        &[
            (50, 700, "21 098"),
            (250, 700, "123 456 789"),
            (450, 700, "35,40 EUR"),
            (50, 686, "ENTIDADE"),
            (250, 686, "REFERÊNCIA"),
            (450, 686, "MONTANTE"),
        ],
    );

    let page = page_lines(&path, PageSelector::First).unwrap();
    assert_eq!(
        page,
        lines(&["21 098", "ENTIDADE", "123 456 789", "REFERÊNCIA", "35,40 EUR", "MONTANTE"])
    );
}

// ============================================================================
// EPAL Extraction Tests
// ============================================================================

#[test]
fn test_extract_epal_fields() {
    let invoice = extract_epal(&lines(EPAL_PAGE)).unwrap();
    assert_eq!(invoice.entity, "20 081");
    assert_eq!(invoice.reference, "555 111 222");
    assert_eq!(invoice.amount, "18,92 EUR");
    assert_eq!(invoice.due_date, date(2020, 2, 10));
    assert_eq!(invoice.next_reading_date, None);
}

#[test]
fn test_extract_epal_truncated_block() {
    let page = lines(&["PARA PAGAMENTO EM AGENTES", "20 081"]);
    let err = extract_epal(&page).unwrap_err();
    assert!(matches!(err, FaturaError::Layout { vendor: Vendor::Epal, .. }));
}

#[test]
fn test_extract_epal_blank_field() {
    let mut page = EPAL_PAGE.to_vec();
    page[3] = "   ";
    assert!(extract_epal(&lines(&page)).is_err());
}

// ============================================================================
// EDP Extraction Tests
// ============================================================================

#[test]
fn test_extract_edp_fields() {
    let invoice = extract_edp(&lines(EDP_PAYMENT_PAGE)).unwrap();
    assert_eq!(invoice.entity, "10 559");
    assert_eq!(invoice.reference, "987 654 321");
    assert_eq!(invoice.amount, "61,33 EUR");
    assert_eq!(invoice.due_date, date(2020, 1, 28));
    assert_eq!(invoice.next_reading_date, Some(date(2020, 2, 20)));
}

#[test]
fn test_extract_edp_anchor_must_match_whole_line() {
    let page = lines(&["Data limite de pagamento: 28.01.2020", "10 559"]);
    assert!(matches!(
        extract_edp(&page),
        Err(FaturaError::Layout { vendor: Vendor::Edp, .. })
    ));
}

#[test]
fn test_extract_lines_dispatches_by_vendor() {
    let invoice = extract_lines(Vendor::Epal, &lines(EPAL_PAGE)).unwrap();
    assert_eq!(invoice.reference, "555 111 222");
    assert!(extract_lines(Vendor::Edp, &lines(EPAL_PAGE)).is_err());
}

// ============================================================================
// PDF Line Extraction Tests
// ============================================================================

#[test]
fn test_page_lines_first_and_last() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edp.pdf");
    write_pdf(&path, &[EDP_SUMMARY_PAGE, EDP_PAYMENT_PAGE]);

    let first = page_lines(&path, PageSelector::First).unwrap();
    assert_eq!(first, lines(EDP_SUMMARY_PAGE));

    let last = page_lines(&path, PageSelector::Last).unwrap();
    assert_eq!(last, lines(EDP_PAYMENT_PAGE));
}

#[test]
fn test_page_lines_decodes_win_ansi() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gold.pdf");
    write_pdf(&path, &[GOLD_PAGE]);

    let first = page_lines(&path, PageSelector::First).unwrap();
    assert!(first.iter().any(|l| l == "REFERÊNCIA"));
}

#[test]
fn test_page_lines_from_memory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("epal.pdf");
    write_pdf(&path, &[EPAL_PAGE]);

    let bytes = std::fs::read(&path).unwrap();
    let from_memory = page_lines_mem(&bytes, PageSelector::Last).unwrap();
    assert_eq!(from_memory, lines(EPAL_PAGE));
}

#[test]
fn test_page_lines_nonexistent_file() {
    assert!(page_lines("/nonexistent/fatura_edp.pdf", PageSelector::First).is_err());
}

#[test]
fn test_page_lines_not_a_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("epal.pdf");
    std::fs::write(&path, b"not a pdf at all").unwrap();
    assert!(page_lines(&path, PageSelector::First).is_err());
}

// ============================================================================
// Pipeline Tests
// ============================================================================

#[test]
fn test_collect_events_orders_by_vendor() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(&dir.path().join("a_gold.pdf"), &[GOLD_PAGE]);
    write_pdf(&dir.path().join("b_epal.pdf"), &[EPAL_PAGE]);
    write_pdf(&dir.path().join("c_edp.pdf"), &[EDP_SUMMARY_PAGE, EDP_PAYMENT_PAGE]);
    std::fs::write(dir.path().join("d_recibo.pdf"), b"ignored").unwrap();

    let files = scan_directory(dir.path()).unwrap();
    assert_eq!(files.len(), 4);

    let events = collect_events(&files).unwrap();
    let titles: Vec<&str> = events.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Fatura EDP", "Fatura EPAL", "Fatura Gold"]);
    assert_eq!(events[0].start, date(2020, 1, 28));
    assert!(events[2].description.starts_with("REFERÊNCIA: 123 456 789\n"));
}

#[test]
fn test_collect_events_reports_failing_file() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(&dir.path().join("epal.pdf"), &[&["nada aqui"]]);

    let files = scan_directory(dir.path()).unwrap();
    match collect_events(&files) {
        Err(FaturaError::Invoice { vendor, path, source }) => {
            assert_eq!(vendor, Vendor::Epal);
            assert!(path.ends_with("epal.pdf"));
            assert!(matches!(*source, FaturaError::Layout { .. }));
        }
        other => panic!("expected an invoice error, got {:?}", other),
    }
}

#[test]
fn test_dry_run_leaves_files_in_place() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(&dir.path().join("epal_fevereiro.pdf"), &[EPAL_PAGE]);

    let config = Config {
        directory: dir.path().to_path_buf(),
        dry_run: true,
        ..Config::default()
    };
    let summary = run(&config).unwrap();

    assert_eq!(summary.events.len(), 1);
    assert!(summary.links.is_empty());
    assert!(summary.archive_dir.is_none());
    assert!(dir.path().join("epal_fevereiro.pdf").is_file());
}

#[test]
fn test_layout_failure_stops_before_authorization() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(&dir.path().join("gold.pdf"), &[&["sem dados"]]);

    // No credentials exist, so reaching authorization would yield Auth instead
    let config = Config {
        directory: dir.path().to_path_buf(),
        credentials_path: dir.path().join("missing-credentials.json"),
        token_path: dir.path().join("token.json"),
        ..Config::default()
    };
    assert!(matches!(run(&config), Err(FaturaError::Invoice { .. })));
    assert!(dir.path().join("gold.pdf").is_file());
}

#[test]
fn test_missing_credentials_is_auth_error() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(&dir.path().join("epal.pdf"), &[EPAL_PAGE]);

    let config = Config {
        directory: dir.path().to_path_buf(),
        credentials_path: dir.path().join("missing-credentials.json"),
        token_path: dir.path().join("token.json"),
        ..Config::default()
    };
    assert!(matches!(run(&config), Err(FaturaError::Auth(_))));
    assert!(dir.path().join("epal.pdf").is_file());
}

// ============================================================================
// Calendar API Tests
// ============================================================================

/// Answer one connection per canned `(status, body)` response, in order,
/// returning the head and body of every request received
fn serve(
    responses: Vec<(&'static str, String)>,
) -> (String, thread::JoinHandle<Vec<(String, String)>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let handle = thread::spawn(move || {
        let mut requests = Vec::new();
        for (status, body) in responses {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);

            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
                head.push_str(&line);
            }

            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).unwrap();

            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            )
            .unwrap();
            stream.flush().unwrap();

            requests.push((head, String::from_utf8(request_body).unwrap()));
        }
        requests
    });

    (base, handle)
}

fn created(id: &str) -> (&'static str, String) {
    (
        "200 OK",
        format!(r#"{{"id":"{id}","htmlLink":"https://www.google.com/calendar/event?eid={id}"}}"#),
    )
}

fn sample_event() -> ReminderEvent {
    let invoice = extract_epal(&lines(EPAL_PAGE)).unwrap();
    ReminderEvent::from_invoice(Vendor::Epal, &invoice)
}

#[test]
fn test_insert_event_posts_json_with_bearer() {
    let (base, handle) = serve(vec![created("evt1")]);
    let client = CalendarClient::with_base_url("ya29.token", &base).unwrap();

    let link = client
        .insert_event("primary", &sample_event().to_request("Europe/Lisbon"))
        .unwrap();
    assert_eq!(link, "https://www.google.com/calendar/event?eid=evt1");

    let requests = handle.join().unwrap();
    let (head, body) = &requests[0];
    assert!(head.starts_with("POST /calendars/primary/events?sendUpdates=all HTTP/1.1"));
    assert!(head.to_lowercase().contains("authorization: bearer ya29.token"));

    let json: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(json["summary"], "Fatura EPAL");
    assert_eq!(json["start"]["dateTime"], "2020-02-10T00:00:00+00:00");
    assert_eq!(json["end"]["dateTime"], "2020-02-11T00:00:00+00:00");
}

#[test]
fn test_insert_event_api_error() {
    let (base, handle) = serve(vec![(
        "401 Unauthorized",
        r#"{"error":{"code":401}}"#.to_string(),
    )]);
    let client = CalendarClient::with_base_url("expired", &base).unwrap();

    let result = client.insert_event("primary", &sample_event().to_request("Europe/Lisbon"));
    handle.join().unwrap();

    match result {
        Err(FaturaError::Api { status, body }) => {
            assert_eq!(status, 401);
            assert!(body.contains("401"));
        }
        other => panic!("expected an API error, got {:?}", other),
    }
}

// ============================================================================
// Full Run Tests
// ============================================================================

/// Write a token cache entry expiring `valid_for` from now
fn write_token(path: &Path, access_token: &str, refresh_token: Option<&str>, valid_for: Duration) {
    let token = StoredToken {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.map(str::to_string),
        expires_at: Utc::now() + valid_for,
        scope: Some("https://www.googleapis.com/auth/calendar".to_string()),
        token_type: "Bearer".to_string(),
    };
    std::fs::write(path, serde_json::to_string(&token).unwrap()).unwrap();
}

fn write_invoices(dir: &Path) {
    write_pdf(&dir.join("gold_janeiro.pdf"), &[GOLD_PAGE]);
    write_pdf(&dir.join("epal_fevereiro.pdf"), &[EPAL_PAGE]);
    write_pdf(&dir.join("edp_janeiro.pdf"), &[EDP_SUMMARY_PAGE, EDP_PAYMENT_PAGE]);
}

fn summaries(requests: &[(String, String)]) -> Vec<String> {
    requests
        .iter()
        .filter(|(head, _)| head.contains("/events?"))
        .map(|(_, body)| {
            let json: serde_json::Value = serde_json::from_str(body).unwrap();
            json["summary"].as_str().unwrap().to_string()
        })
        .collect()
}

#[test]
fn test_run_creates_events_then_archives() {
    let dir = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    write_invoices(dir.path());
    let token_path = state.path().join("token.json");
    write_token(&token_path, "ya29.cached", Some("1//keep"), Duration::hours(1));

    let (base, handle) = serve(vec![created("edp"), created("epal"), created("gold")]);
    let config = Config {
        directory: dir.path().to_path_buf(),
        credentials_path: state.path().join("missing-credentials.json"),
        token_path,
        api_base: base,
        ..Config::default()
    };
    let summary = run(&config).unwrap();
    let requests = handle.join().unwrap();

    assert_eq!(summaries(&requests), vec!["Fatura EDP", "Fatura EPAL", "Fatura Gold"]);
    assert!(requests
        .iter()
        .all(|(head, _)| head.to_lowercase().contains("authorization: bearer ya29.cached")));
    assert_eq!(
        summary.links,
        vec![
            "https://www.google.com/calendar/event?eid=edp",
            "https://www.google.com/calendar/event?eid=epal",
            "https://www.google.com/calendar/event?eid=gold",
        ]
    );

    let archive_dir = summary.archive_dir.unwrap();
    assert_eq!(archive_dir.parent(), Some(dir.path()));
    let folder = archive_dir.file_name().unwrap().to_str().unwrap();
    assert!(NaiveDate::parse_from_str(folder, "%Y-%m-%d").is_ok());
    for name in ["gold_janeiro.pdf", "epal_fevereiro.pdf", "edp_janeiro.pdf"] {
        assert!(archive_dir.join(name).is_file());
        assert!(!dir.path().join(name).exists());
    }
}

#[test]
fn test_failed_insert_leaves_files_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    write_invoices(dir.path());
    let token_path = state.path().join("token.json");
    write_token(&token_path, "ya29.cached", None, Duration::hours(1));

    let (base, handle) = serve(vec![
        created("edp"),
        ("500 Internal Server Error", r#"{"error":{"code":500}}"#.to_string()),
    ]);
    let config = Config {
        directory: dir.path().to_path_buf(),
        token_path,
        api_base: base,
        ..Config::default()
    };
    let result = run(&config);
    handle.join().unwrap();

    assert!(matches!(result, Err(FaturaError::Api { status: 500, .. })));
    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries.len(), 3);
    assert!(dir.path().join("gold_janeiro.pdf").is_file());
}

#[test]
fn test_run_refreshes_expired_token() {
    let dir = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    write_pdf(&dir.path().join("epal_fevereiro.pdf"), &[EPAL_PAGE]);
    let token_path = state.path().join("token.json");
    write_token(&token_path, "ya29.stale", Some("1//old"), Duration::hours(-1));

    let (base, handle) = serve(vec![
        (
            "200 OK",
            r#"{"access_token":"ya29.fresh","expires_in":3599,"token_type":"Bearer"}"#.to_string(),
        ),
        created("epal"),
    ]);
    let credentials_path = state.path().join("credentials.json");
    std::fs::write(
        &credentials_path,
        format!(
            r#"{{"installed":{{"client_id":"id.apps","client_secret":"s3cret","token_uri":"{base}/token"}}}}"#
        ),
    )
    .unwrap();

    let config = Config {
        directory: dir.path().to_path_buf(),
        credentials_path,
        token_path: token_path.clone(),
        api_base: base,
        archive: false,
        ..Config::default()
    };
    let summary = run(&config).unwrap();
    let requests = handle.join().unwrap();

    let (token_head, token_body) = &requests[0];
    assert!(token_head.starts_with("POST /token HTTP/1.1"));
    assert!(token_body.contains("grant_type=refresh_token"));
    assert!(token_body.contains("refresh_token=1%2F%2Fold"));
    assert!(requests[1]
        .0
        .to_lowercase()
        .contains("authorization: bearer ya29.fresh"));
    assert_eq!(summary.links.len(), 1);
    assert!(summary.archive_dir.is_none());

    let saved: StoredToken =
        serde_json::from_str(&std::fs::read_to_string(&token_path).unwrap()).unwrap();
    assert_eq!(saved.access_token, "ya29.fresh");
    assert_eq!(saved.refresh_token.as_deref(), Some("1//old"));
    assert!(saved.expires_at > Utc::now());
}
