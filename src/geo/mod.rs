use crate::error::AppError;
use crate::models::provider::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn validate(p: &GeoPoint) -> Result<(), AppError> {
    if p.lat.abs() > 90.0 || p.lng.abs() > 180.0 || !p.lat.is_finite() || !p.lng.is_finite() {
        return Err(AppError::InvalidCoordinate {
            lat: p.lat,
            lng: p.lng,
        });
    }
    Ok(())
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Great-circle distance with coordinate validation on both endpoints.
pub fn distance_km(a: &GeoPoint, b: &GeoPoint) -> Result<f64, AppError> {
    validate(a)?;
    validate(b)?;
    Ok(haversine_km(a, b))
}

/// Linear fallback when no routed travel time is available.
pub fn estimate_driving_minutes(distance_km: f64, avg_speed_kmh: f64) -> f64 {
    if avg_speed_kmh <= 0.0 {
        return f64::INFINITY;
    }
    distance_km.max(0.0) / avg_speed_kmh * 60.0
}
