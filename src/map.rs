use crate::types::Activity;
use crate::utils::haversine_km;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn center(&self) -> (f64, f64) {
        (
            self.min_lat + (self.max_lat - self.min_lat) / 2.0,
            self.min_lon + (self.max_lon - self.min_lon) / 2.0,
        )
    }

    /// Corner-to-corner distance, the input to the zoom heuristic.
    pub fn diagonal_km(&self) -> f64 {
        haversine_km(self.min_lat, self.min_lon, self.max_lat, self.max_lon)
    }
}

/// The renderable view over one activity's track: every positioned
/// trackpoint in recording order, pauses skipped, plus the bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackView {
    pub points: Vec<(f64, f64)>,
    pub bbox: BoundingBox,
}

impl TrackView {
    /// None when the activity has no positioned trackpoints at all.
    pub fn from_activity(activity: &Activity) -> Option<Self> {
        let mut points = Vec::new();
        for lap in &activity.laps {
            for p in &lap.trackpoints {
                if let (Some(lat), Some(lon)) = (p.latitude, p.longitude) {
                    points.push((lat, lon));
                }
            }
        }
        let &(first_lat, first_lon) = points.first()?;
        let mut bbox = BoundingBox {
            min_lat: first_lat,
            max_lat: first_lat,
            min_lon: first_lon,
            max_lon: first_lon,
        };
        for &(lat, lon) in &points[1..] {
            bbox.min_lat = bbox.min_lat.min(lat);
            bbox.max_lat = bbox.max_lat.max(lat);
            bbox.min_lon = bbox.min_lon.min(lon);
            bbox.max_lon = bbox.max_lon.max(lon);
        }
        Some(Self { points, bbox })
    }

    /// Zoom level bucketed by the bounding-box diagonal.
    pub fn zoom_level(&self) -> u8 {
        let km = self.bbox.diagonal_km();
        if km < 0.32 {
            16
        } else if km < 0.8 {
            15
        } else if km < 2.2 {
            14
        } else if km < 3.2 {
            13
        } else if km < 4.8 {
            12
        } else if km < 11.2 {
            11
        } else if km < 24.0 {
            10
        } else {
            9
        }
    }
}

/// A self-contained HTML page rendering the activity's track as a polyline,
/// centered on the bounding box. Activities without positions get a stub.
pub fn activity_map_html(activity: &Activity) -> String {
    match TrackView::from_activity(activity) {
        Some(view) => render_page(activity, &view),
        None => "<html><body>No trackpoints</body></html>".to_string(),
    }
}

fn render_page(activity: &Activity, view: &TrackView) -> String {
    let title = format!("Activity Map: {} ({})", activity.start_time, activity.sport.name);
    let (center_lat, center_lon) = view.bbox.center();
    let zoom = view.zoom_level();

    let mut coords = String::new();
    for (lat, lon) in &view.points {
        let _ = write!(coords, "[{lat},{lon}],");
    }

    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8"/>
    <title>{title}</title>
    <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css"/>
    <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
    <style>#map {{ width: 750px; height: 550px; border: 1px solid black; }}</style>
  </head>
  <body>
    <div id="map"></div>
    <script>
      var map = L.map('map').setView([{center_lat}, {center_lon}], {zoom});
      L.tileLayer('https://tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png', {{
        maxZoom: 19,
        attribution: '&copy; OpenStreetMap contributors'
      }}).addTo(map);
      L.polyline([{coords}], {{ color: '#0000ff', weight: 3 }}).addTo(map);
    </script>
  </body>
</html>
"#
    )
}
