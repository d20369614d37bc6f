use sw_core::daily_point::DailyPoint;
use sw_core::gateway::WeatherSeries;

/// Set each point's temperature from the weather series by calendar day.
///
/// Days missing from `weather` get `None`. One project-wide series is
/// applied to every cell of the project.
pub fn join_weather(points: &mut [DailyPoint], weather: &WeatherSeries) {
    for point in points.iter_mut() {
        point.temperature = weather.get(&point.date).copied();
    }
}
