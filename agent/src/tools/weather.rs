use crate::Result;
use crate::llm::Message;
use crate::tools::{FunctionalTool, ToolCall, ToolDefinition};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::time::Duration;

pub const GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
pub const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

const NAME: &str = "get_weather";

/// Current conditions from Open-Meteo, resolved through its geocoding API.
#[derive(Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
    geocoding_url: String,
    forecast_url: String,
}

#[derive(Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<Place>,
}

#[derive(Deserialize)]
struct Place {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct ForecastResponse {
    current_weather: Option<CurrentWeather>,
}

#[derive(Deserialize)]
struct CurrentWeather {
    temperature: f64,
    windspeed: f64,
}

impl WeatherClient {
    pub fn new() -> Result<Self> {
        Self::with_endpoints(GEOCODING_URL, FORECAST_URL)
    }

    pub fn with_endpoints(geocoding_url: &str, forecast_url: &str) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()?,
            geocoding_url: geocoding_url.to_string(),
            forecast_url: forecast_url.to_string(),
        })
    }

    /// Describes the current weather in `city`.
    ///
    /// An unknown city or a forecast without current conditions is reported
    /// in the returned text; only transport failures are errors.
    pub async fn get_weather(&self, city: &str) -> Result<String> {
        let geo: GeocodingResponse = self
            .client
            .get(&self.geocoding_url)
            .query(&[
                ("name", city),
                ("count", "1"),
                ("language", "en"),
                ("format", "json"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(place) = geo.results.into_iter().next() else {
            return Ok(format!("City {} not found.", city));
        };

        let forecast: ForecastResponse = self
            .client
            .get(&self.forecast_url)
            .query(&[
                ("latitude", place.latitude.to_string()),
                ("longitude", place.longitude.to_string()),
                ("current_weather", "true".to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(match forecast.current_weather {
            Some(current) => format!(
                "The weather in {} is {}°C with wind of {} km/h.",
                city, current.temperature, current.windspeed
            ),
            None => "Could not get the weather right now.".to_string(),
        })
    }
}

#[derive(Deserialize, JsonSchema)]
struct WeatherArgs {
    city: String,
}

pub struct WeatherTool(WeatherClient);

impl WeatherTool {
    pub fn new(client: WeatherClient) -> Box<Self> {
        Box::new(Self(client))
    }
}

#[async_trait]
impl FunctionalTool for WeatherTool {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<WeatherArgs>(NAME, "get the current weather for a city")
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: WeatherArgs = call.args()?;
        Ok(Message::Tool {
            name: NAME.to_string(),
            result: self.0.get_weather(&args.city).await?,
        })
    }
}
