//! Crawler and scripted-client detection for request submissions.

/// Lowercase fragments that mark a user agent as automated.
const AUTOMATED_MARKERS: &[&str] = &[
  "bot",
  "crawl",
  "spider",
  "slurp",
  "scrape",
  "archiver",
  "facebookexternalhit",
  "embedly",
  "preview",
  "headless",
  "phantomjs",
  "curl/",
  "wget/",
  "python-requests",
  "python-urllib",
  "aiohttp",
  "go-http-client",
  "java/",
  "okhttp",
  "libwww-perl",
  "httpclient",
  "guzzlehttp",
  "axios/",
  "node-fetch",
];

/// A missing or blank user agent is let through; the rate limit still applies.
pub fn is_automated(user_agent: Option<&str>) -> bool {
  let Some(agent) = user_agent.map(str::trim).filter(|a| !a.is_empty()) else {
    return false;
  };

  let agent = agent.to_lowercase();
  AUTOMATED_MARKERS.iter().any(|marker| agent.contains(marker))
}
