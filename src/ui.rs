//! Server-rendered dashboard page. One string template, placeholders filled
//! from the latest snapshot.

use crate::notify::fmt_pct;
use crate::types::Snapshot;

pub fn render_dashboard(latest: Option<&Snapshot>, dates: &[String]) -> String {
    let (summary_html, jobs_html) = match latest {
        Some(snapshot) => (render_summary(snapshot), render_job_table(snapshot)),
        None => (
            String::new(),
            "<p class=\"muted\">No snapshots yet. Run an ingest to get started.</p>".to_string(),
        ),
    };

    let dates_html = if dates.is_empty() {
        String::new()
    } else {
        let items: String = dates
            .iter()
            .map(|d| format!("<li><a href=\"/api/snapshots/{0}\">{0}</a></li>", escape(d)))
            .collect();
        format!("<h2>History</h2><ul class=\"dates\">{items}</ul>")
    };

    PAGE_HTML
        .replace("{{SUMMARY}}", &summary_html)
        .replace("{{JOBS}}", &jobs_html)
        .replace("{{DATES}}", &dates_html)
}

fn render_summary(snapshot: &Snapshot) -> String {
    let t = &snapshot.totals;
    format!(
        "<div class=\"cards\">\
         <div class=\"card\"><span class=\"label\">Snapshot</span><span class=\"value\">{} ({})</span></div>\
         <div class=\"card\"><span class=\"label\">Burn</span><span class=\"value\">{}</span></div>\
         <div class=\"card\"><span class=\"label\">GM</span><span class=\"value\">{}</span></div>\
         <div class=\"card\"><span class=\"label\">At risk</span><span class=\"value\">{}</span></div>\
         <div class=\"card\"><span class=\"label\">Exceptions</span><span class=\"value\">{}</span></div>\
         </div>",
        escape(&snapshot.date),
        snapshot.mode,
        fmt_pct(t.burn_pct),
        fmt_pct(t.gm_pct),
        t.at_risk_count,
        t.exception_count,
    )
}

fn render_job_table(snapshot: &Snapshot) -> String {
    let rows: String = snapshot
        .jobs
        .iter()
        .map(|r| {
            let risk_class = if r.metrics.at_risk { " class=\"risk\"" } else { "" };
            let risk_label = if r.metrics.at_risk { "⚠" } else { "" };
            format!(
                "<tr{risk_class}><td>{}</td><td>{}</td><td>{}</td>\
                 <td>{:.0}</td><td>{:.0}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                r.job.id,
                escape(&r.job.name),
                escape(&r.job.stage),
                r.job.budget_cost,
                r.job.actual_cost,
                fmt_pct(r.metrics.burn_pct),
                fmt_pct(r.metrics.gm_pct),
                risk_label,
                escape(&r.metrics.exceptions.join(", ")),
            )
        })
        .collect();

    format!(
        "<table class=\"jobs\"><thead><tr>\
         <th>ID</th><th>Job</th><th>Stage</th><th>Budget</th><th>Actual</th>\
         <th>Burn</th><th>GM</th><th></th><th>Exceptions</th>\
         </tr></thead><tbody>{rows}</tbody></table>"
    )
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

const PAGE_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>EOD Dashboard</title>
  <style>
    body { font-family: system-ui, -apple-system, "Segoe UI", Roboto, Arial, sans-serif; padding: 2rem; color: #222; }
    .bar { display: flex; gap: 1rem; margin-bottom: 1.25rem; }
    form button { padding: .6rem 1rem; font-weight: 600; cursor: pointer; }
    .cards { display: flex; gap: 1rem; flex-wrap: wrap; margin-bottom: 1rem; }
    .card { border: 1px solid #ddd; border-radius: 8px; padding: .8rem 1.2rem; min-width: 120px; }
    .card .label { display: block; font-size: .8rem; text-transform: uppercase; color: #888; }
    .card .value { font-size: 1.3rem; font-weight: 600; }
    table.jobs { border-collapse: collapse; width: 100%; max-width: 1100px; }
    table.jobs th, table.jobs td { border: 1px solid #ddd; padding: .4rem .6rem; text-align: left; }
    tr.risk td { background: #fff3f0; }
    ul.dates { columns: 4; max-width: 800px; }
    .muted { color: #777; }
  </style>
</head>
<body>
  <h1>EOD Dashboard</h1>
  <div class="bar">
    <form method="post" action="/ingest/live"><button type="submit">Run Live Ingest</button></form>
    <form method="post" action="/ingest/demo"><button type="submit">Load Demo Data</button></form>
    <form method="post" action="/share/slack"><button type="submit">Share to Slack</button></form>
  </div>
  {{SUMMARY}}
  {{JOBS}}
  {{DATES}}
</body>
</html>
"#;
